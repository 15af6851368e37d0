//! Operator commands run from the binary instead of over HTTP.

use crate::config::YapperConfig;
use crate::database::Database;
use crate::identity::{Role, SessionSigner};
use crate::reconcile::{reconcile_counters, ReconcileReport};
use crate::users::UserService;
use anyhow::Result;

/// Provisions an account. Credentials are handled elsewhere; this only
/// records the handle and role tier.
pub fn create_user(database: &Database, handle: &str, role_level: i64) -> Result<()> {
    let user = UserService::new(database.clone()).create_user(handle, Role::from_level(role_level))?;
    println!(
        "Created user {} ({}) with role level {}",
        user.id,
        user.handle,
        user.role.level()
    );
    Ok(())
}

/// Prints a signed session credential for `handle`, valid for the configured
/// session TTL.
pub fn issue_token(config: &YapperConfig, database: &Database, handle: &str) -> Result<()> {
    let user = UserService::new(database.clone()).get_by_handle(handle)?;
    let signer = SessionSigner::new(&config.session);
    let token = signer.issue(&user)?;
    println!("{token}");
    eprintln!(
        "Token for {} (id {}) expires in {} seconds",
        user.handle,
        user.id,
        signer.ttl_secs()
    );
    Ok(())
}

pub fn reconcile(database: &Database) -> Result<ReconcileReport> {
    let report = reconcile_counters(database)?;
    if report.total() == 0 {
        println!("All counters consistent.");
    } else {
        println!(
            "Corrected {} post(s), {} comment(s), {} user(s).",
            report.posts, report.comments, report.users
        );
    }
    Ok(report)
}
