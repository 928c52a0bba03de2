use test_case::test_case;

use crate::{Device, Error, HostDevice, Texture};

#[test]
fn test_global_allocation_is_stable_and_zeroed() {
    let device = HostDevice::default();
    let address = device.allocate_global("m.ptx", "counter", 12).unwrap();

    assert_eq!(device.global_allocation("m.ptx", "counter"), Some(address));
    assert_eq!(device.read_global("m.ptx", "counter").unwrap(), vec![0u8; 12]);
    assert_eq!(address.0 % 16, 0);
}

#[test_case(1)]
#[test_case(16)]
#[test_case(4096)]
fn test_write_then_read(bytes: usize) {
    let device = HostDevice::default();
    device.allocate_global("m.ptx", "buf", bytes).unwrap();
    let data: Vec<u8> = (0..bytes).map(|i| i as u8).collect();
    device.write_global("m.ptx", "buf", &data).unwrap();
    assert_eq!(device.read_global("m.ptx", "buf").unwrap(), data);
}

#[test]
fn test_oversized_write_is_rejected() {
    let device = HostDevice::default();
    device.allocate_global("m.ptx", "buf", 4).unwrap();
    let err = device.write_global("m.ptx", "buf", &[0; 8]).unwrap_err();
    assert!(matches!(err, Error::SizeMismatch { expected: 4, actual: 8 }));
}

#[test]
fn test_double_allocation_is_rejected() {
    let device = HostDevice::default();
    device.allocate_global("m.ptx", "buf", 4).unwrap();
    assert!(matches!(device.allocate_global("m.ptx", "buf", 4), Err(Error::AlreadyAllocated { .. })));
}

#[test]
fn test_lookups_are_scoped_by_module_path() {
    let device = HostDevice::default();
    device.allocate_global("a.ptx", "buf", 4).unwrap();
    assert!(device.global_allocation("b.ptx", "buf").is_none());
    assert!(device.global_allocation("a.ptx", "other").is_none());
}

#[test]
fn test_texture_registry() {
    let device = HostDevice::default();
    let first = device.register_texture("m.ptx", "texA", Texture::from_f32(&[1.0, 2.0])).unwrap();
    let second = device.register_texture("m.ptx", "texB", Texture::from_f32(&[3.0])).unwrap();

    assert_ne!(first, second);
    assert_eq!(device.texture_reference("m.ptx", "texA"), Some(first));
    assert_eq!(device.texture_reference("m.ptx", "texC"), None);
    assert!(device.texture_data(second).is_some());
    assert!(matches!(
        device.register_texture("m.ptx", "texA", Texture::from_f32(&[])),
        Err(Error::AlreadyRegistered { .. })
    ));
}
