pub mod current_principal;
pub mod permissions;
pub mod session;
