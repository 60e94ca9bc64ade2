pub mod development_license_checker;
pub mod resource_module_loader;
pub mod resource_resolver;
pub mod scripted_engine;
pub mod worker_host;
