//! Backend drivers.

mod aws;
mod openstack;

pub use aws::AwsDriver;
pub use openstack::OpenStackDriver;
