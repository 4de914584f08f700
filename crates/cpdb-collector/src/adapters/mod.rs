//! Production implementations of [`crate::AccountStore`] and
//! [`crate::AccountSource`].

mod pg;
mod social;

pub use pg::PgAccountStore;
pub use social::SocialAccountSource;
