mod cache;
mod layout;
