//! Identity roles resolved from a session token.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The authorizer/enterer pair behind a session, with the admin flag from
/// the session row. Resolved transiently per request; never persisted here.
#[derive(Serialize, Deserialize, Clone, Copy, FromRow, Debug)]
pub struct Identity {
    /// Accountable data owner.
    pub authorizer_no: i64,

    /// Acting user.
    pub enterer_no: i64,

    /// Whether the session carries superuser rights.
    pub is_admin: bool,
}
