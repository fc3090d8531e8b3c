//! Repository layer for the canonical store.

mod member_repo;
mod memory_member_repo;

pub use member_repo::{MemberStore, PgMemberRepository};
pub use memory_member_repo::MemoryMemberRepository;
