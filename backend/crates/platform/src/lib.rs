//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (HMAC-SHA256, authenticated encryption, random tokens)
//! - Password hashing (bcrypt)
//! - Cookie configuration and signing
//! - Client identification
//! - Runtime configuration
//! - Mail dispatch port

pub mod client;
pub mod config;
pub mod cookie;
pub mod crypto;
pub mod mail;
pub mod password;
