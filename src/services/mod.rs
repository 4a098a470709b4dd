pub mod deployer;
pub mod object_store;
pub mod oss_client;
