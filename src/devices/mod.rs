//! Push device registration

mod registry;

pub use registry::DeviceRegistry;
