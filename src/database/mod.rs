pub mod pool;

/// True when `err` is a unique-constraint violation, optionally on a specific constraint.
pub fn is_unique_violation(err: &sqlx::Error, constraint: Option<&str>) -> bool {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => match constraint {
            Some(name) => db.constraint() == Some(name),
            None => true,
        },
        _ => false,
    }
}
