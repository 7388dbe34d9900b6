pub mod credits;
pub mod jobs;
#[cfg(test)]
pub mod users;

pub use credits::Credits;
pub use jobs::Jobs;
#[cfg(test)]
pub use users::Users;
