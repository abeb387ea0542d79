mod support;

mod health_test;
mod provision_test;
mod services_test;
mod status_test;
mod sync_test;
