use sqlx::{postgres::PgPoolOptions, PgPool};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS courses (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(200) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS students (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(200) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS course_students (
        course_id BIGINT NOT NULL REFERENCES courses(id),
        student_id BIGINT NOT NULL REFERENCES students(id),
        PRIMARY KEY (course_id, student_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS student_courses (
        student_id BIGINT NOT NULL REFERENCES students(id),
        course_id BIGINT NOT NULL REFERENCES courses(id),
        PRIMARY KEY (student_id, course_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS grades (
        id BIGSERIAL PRIMARY KEY,
        course_id BIGINT NOT NULL REFERENCES courses(id),
        student_id BIGINT NOT NULL REFERENCES students(id),
        value INTEGER NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS grades_course_student_idx ON grades (course_id, student_id)",
    "CREATE INDEX IF NOT EXISTS courses_name_idx ON courses (name)",
];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Create the records tables if they are missing.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("Records schema ready ({} statements)", SCHEMA.len());
        Ok(())
    }
}
