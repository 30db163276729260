//! Crawl service REST API.

pub mod client;

pub use client::{decode_job_list, CrawlApi, HttpCrawlApi, DEFAULT_API_BASE_URL};
