//! DDL for the import tables. Surrogate keys are declared with the tables so
//! rows get ids as they are inserted.

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sales (
    id           SERIAL PRIMARY KEY,
    name         TEXT,
    year         INT,
    genre        TEXT,
    publisher    TEXT,
    na_sales     DOUBLE PRECISION,
    eu_sales     DOUBLE PRECISION,
    jp_sales     DOUBLE PRECISION,
    other_sales  DOUBLE PRECISION,
    global_sales DOUBLE PRECISION
);

CREATE TABLE IF NOT EXISTS reviews (
    id           SERIAL PRIMARY KEY,
    app_id       INT REFERENCES sales (id) ON DELETE CASCADE,
    app_name     TEXT,
    review_text  TEXT,
    review_score INT,
    review_votes INT
);

CREATE INDEX IF NOT EXISTS reviews_app_id_idx ON reviews (app_id);
CREATE INDEX IF NOT EXISTS reviews_app_name_idx ON reviews (app_name);

CREATE TABLE IF NOT EXISTS import_runs (
    id           SERIAL PRIMARY KEY,
    mode         TEXT NOT NULL,
    sales_rows   BIGINT NOT NULL,
    review_rows  BIGINT NOT NULL,
    completed_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

pub const INSERT_SALE_SQL: &str = "INSERT INTO sales (name, year, genre, publisher, na_sales, eu_sales, jp_sales, other_sales, global_sales) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id";

pub const INSERT_IMPORT_RUN_SQL: &str =
    "INSERT INTO import_runs (mode, sales_rows, review_rows) VALUES ($1, $2, $3)";

pub const IMPORT_RUNS_VISIBLE_SQL: &str = "SELECT to_regclass('import_runs') IS NOT NULL";

pub const IMPORT_RUN_EXISTS_SQL: &str = "SELECT EXISTS (SELECT 1 FROM import_runs)";

pub const SALES_COPY_SQL: &str = "COPY sales (name, year, genre, publisher, na_sales, eu_sales, jp_sales, other_sales, global_sales) \
     FROM STDIN WITH (FORMAT csv, HEADER false, DELIMITER ',', QUOTE '\"')";

// Optional integers arrive as quoted empty strings; FORCE_NULL maps them to NULL.
pub const REVIEWS_COPY_SQL: &str = "COPY reviews (app_id, app_name, review_text, review_score, review_votes) \
     FROM STDIN WITH (FORMAT csv, HEADER false, DELIMITER ',', QUOTE '\"', FORCE_NULL (app_id, review_votes))";
