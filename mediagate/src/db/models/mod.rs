pub mod credits;
pub mod jobs;
#[cfg(test)]
pub mod users;
