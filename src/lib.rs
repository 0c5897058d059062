pub mod check;
pub mod config;
pub mod dhcp;
pub mod introspection;
pub mod manager;
pub mod remote;
pub mod replay;
pub mod runner;
pub mod scenario;
pub mod smoke;
