pub mod backend_client;
pub mod batch_service;
pub mod indicator_service;
pub mod job_poller;
pub mod mount_service;
pub mod notification_service;
pub mod path_service;

#[cfg(test)]
pub mod testing;
