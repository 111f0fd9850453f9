pub mod applications;
pub mod credentials;
pub mod error;
pub mod gmail_auth;
pub mod middleware;
pub mod outreach;
pub mod poller;
pub mod replies;
pub mod routes;
pub mod state;
pub mod webhook;

#[cfg(test)]
mod test_support;
