pub mod handlers;
pub mod models;
pub mod server;

#[cfg(test)]
mod tests;
