pub(crate) mod dhcp;
pub(crate) mod list;
pub(crate) mod run;
