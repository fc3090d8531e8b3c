mod member;

pub use member::{Member, MemberDetail, NewMember, RosterEntry};
