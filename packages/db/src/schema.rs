use crate::{Database, DbError};

/// Define the job table and the id sequence. Safe to run on every start.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    db.query(JOB_SCHEMA).await?.check()?;
    db.query(SEQUENCE_SCHEMA).await?.check()?;
    tracing::debug!("Job schema defined");
    Ok(())
}

// Timestamps are unix milliseconds.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS content ON job TYPE string;
DEFINE FIELD IF NOT EXISTS state ON job TYPE string DEFAULT "pending"
    ASSERT $value IN ["pending", "printed"];
DEFINE FIELD IF NOT EXISTS created_at ON job TYPE int;
DEFINE FIELD IF NOT EXISTS printed_at ON job TYPE option<int>;

DEFINE INDEX IF NOT EXISTS job_state ON job FIELDS state;
"#;

// One counter record per sequence, `sequence:job` for job ids.
const SEQUENCE_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS sequence SCHEMALESS;
"#;
