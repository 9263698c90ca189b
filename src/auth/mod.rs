//! Password hashing, session tokens, and access-code generation.

pub mod codes;
pub mod jwt;
pub mod password;
