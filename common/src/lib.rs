pub mod device;
pub mod req;
