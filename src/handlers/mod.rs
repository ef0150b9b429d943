pub mod cron;
pub mod google_oauth;
