//! Threat-intelligence catalogs: AI service domains, AI provider CIDR
//! blocks, and JA3 client fingerprints.

pub mod ai_domains;
pub mod cidr;
pub mod ja3;

pub use ai_domains::{ai_category, is_ai_domain};
pub use cidr::{CidrMatch, CidrMatcher};
pub use ja3::{Ja3Match, Ja3Matcher, SpoofVerdict};
