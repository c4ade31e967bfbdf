pub mod data_interface;
pub mod model;
pub mod data_interfaces {
    pub mod data_interface_memory;
    pub mod data_interface_mysql;
}
pub mod app_error;
pub mod auth;
pub mod beach_day;
pub mod beach_day_error;
pub mod beach_day_file;
pub mod beaches;
pub mod migration;
pub mod routes;
pub mod scripts;
pub mod server;
pub mod state;
