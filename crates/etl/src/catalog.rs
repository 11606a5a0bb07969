//! Star schema table definitions and every SQL statement run against them.
//!
//! Tables are static data rendered to DDL on demand for the selected
//! [`Dialect`]. Statements carry a short label used in logs and errors.

use std::fmt;
use std::str::FromStr;

use dwh_core::{ConfigFile, IamRoleSettings, S3Settings};
use serde::Serialize;

use crate::error::EtlError;

// ── Dialect ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Warehouse DDL with distribution and sort keys, `COPY` from S3.
    #[default]
    Redshift,
    /// Plain PostgreSQL, used to exercise the schema and transforms locally.
    Postgres,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redshift => "redshift",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redshift" => Ok(Self::Redshift),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("unknown dialect '{other}': must be redshift or postgres")),
        }
    }
}

// ── Table definitions ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistStyle {
    Even,
    All,
    /// Distributed on the column marked `dist_key`.
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub not_null: bool,
    pub primary_key: bool,
    pub identity: bool,
    pub dist_key: bool,
    pub sort_key: bool,
}

impl ColumnDef {
    const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            not_null: false,
            primary_key: false,
            identity: false,
            dist_key: false,
            sort_key: false,
        }
    }

    const fn not_null(self) -> Self {
        Self { not_null: true, ..self }
    }

    const fn primary_key(self) -> Self {
        Self { primary_key: true, ..self }
    }

    const fn identity(self) -> Self {
        Self { identity: true, ..self }
    }

    const fn dist_key(self) -> Self {
        Self { dist_key: true, ..self }
    }

    const fn sort_key(self) -> Self {
        Self { sort_key: true, ..self }
    }

    fn render(&self, dialect: Dialect) -> String {
        let mut out = format!("{} {}", self.name, self.sql_type);
        if self.identity {
            out.push_str(match dialect {
                Dialect::Redshift => " IDENTITY(0,1)",
                Dialect::Postgres => " GENERATED BY DEFAULT AS IDENTITY",
            });
        }
        if self.not_null {
            out.push_str(" NOT NULL");
        }
        if self.primary_key {
            out.push_str(" PRIMARY KEY");
        }
        if dialect == Dialect::Redshift {
            if self.dist_key {
                out.push_str(" DISTKEY");
            }
            if self.sort_key {
                out.push_str(" SORTKEY");
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub dist_style: DistStyle,
}

impl TableDef {
    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", self.name)
    }

    pub fn create_sql(&self, dialect: Dialect) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.render(dialect)))
            .collect::<Vec<_>>()
            .join(",\n");
        let placement = match (dialect, self.dist_style) {
            (Dialect::Redshift, DistStyle::Even) => "\nDISTSTYLE EVEN",
            (Dialect::Redshift, DistStyle::All) => "\nDISTSTYLE ALL",
            _ => "",
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n){};",
            self.name, columns, placement
        )
    }
}

const VARCHAR: &str = "VARCHAR(256)";

pub const STAGING_EVENTS: TableDef = TableDef {
    name: "staging_events",
    columns: &[
        ColumnDef::new("artist", VARCHAR),
        ColumnDef::new("auth", VARCHAR),
        ColumnDef::new("firstName", VARCHAR),
        ColumnDef::new("gender", "CHAR(1)"),
        ColumnDef::new("itemInSession", "INT"),
        ColumnDef::new("lastName", VARCHAR),
        ColumnDef::new("length", "FLOAT"),
        ColumnDef::new("level", VARCHAR),
        ColumnDef::new("location", VARCHAR),
        ColumnDef::new("method", VARCHAR),
        ColumnDef::new("page", VARCHAR),
        ColumnDef::new("registration", "FLOAT"),
        ColumnDef::new("sessionId", "INT"),
        ColumnDef::new("song", VARCHAR),
        ColumnDef::new("status", "INT"),
        ColumnDef::new("ts", "BIGINT"),
        ColumnDef::new("userAgent", VARCHAR),
        ColumnDef::new("userId", "INT"),
    ],
    dist_style: DistStyle::Even,
};

pub const STAGING_SONGS: TableDef = TableDef {
    name: "staging_songs",
    columns: &[
        ColumnDef::new("num_songs", "INT"),
        ColumnDef::new("artist_id", VARCHAR),
        ColumnDef::new("artist_latitude", "FLOAT"),
        ColumnDef::new("artist_longitude", "FLOAT"),
        ColumnDef::new("artist_location", VARCHAR),
        ColumnDef::new("artist_name", VARCHAR),
        ColumnDef::new("song_id", VARCHAR),
        ColumnDef::new("title", VARCHAR),
        ColumnDef::new("duration", "DECIMAL"),
        ColumnDef::new("year", "INT"),
    ],
    dist_style: DistStyle::Even,
};

pub const SONGPLAYS: TableDef = TableDef {
    name: "songplays",
    columns: &[
        ColumnDef::new("songplay_id", "INT").identity().primary_key(),
        ColumnDef::new("start_time", "TIMESTAMP").not_null().sort_key(),
        ColumnDef::new("user_id", "INT").not_null(),
        ColumnDef::new("level", VARCHAR),
        ColumnDef::new("song_id", VARCHAR).dist_key(),
        ColumnDef::new("artist_id", VARCHAR),
        ColumnDef::new("session_id", "INT"),
        ColumnDef::new("location", VARCHAR),
        ColumnDef::new("user_agent", VARCHAR),
    ],
    dist_style: DistStyle::Key,
};

pub const USERS: TableDef = TableDef {
    name: "users",
    columns: &[
        ColumnDef::new("user_id", "INT").primary_key(),
        ColumnDef::new("first_name", VARCHAR).not_null(),
        ColumnDef::new("last_name", VARCHAR).not_null(),
        ColumnDef::new("gender", "CHAR(1)"),
        ColumnDef::new("level", VARCHAR),
    ],
    dist_style: DistStyle::All,
};

pub const SONGS: TableDef = TableDef {
    name: "songs",
    columns: &[
        ColumnDef::new("song_id", VARCHAR).primary_key().dist_key(),
        ColumnDef::new("title", VARCHAR).not_null(),
        ColumnDef::new("artist_id", VARCHAR).not_null(),
        ColumnDef::new("year", "INT").sort_key(),
        ColumnDef::new("duration", "FLOAT"),
    ],
    dist_style: DistStyle::Key,
};

pub const ARTISTS: TableDef = TableDef {
    name: "artists",
    columns: &[
        ColumnDef::new("artist_id", VARCHAR).primary_key().dist_key(),
        ColumnDef::new("name", VARCHAR).not_null().sort_key(),
        ColumnDef::new("location", VARCHAR),
        ColumnDef::new("latitude", "FLOAT"),
        ColumnDef::new("longitude", "FLOAT"),
    ],
    dist_style: DistStyle::Key,
};

pub const TIME: TableDef = TableDef {
    name: "time",
    columns: &[
        ColumnDef::new("start_time", "TIMESTAMP").primary_key().sort_key(),
        ColumnDef::new("hour", "INT").not_null(),
        ColumnDef::new("day", "INT").not_null(),
        ColumnDef::new("week", "INT").not_null(),
        ColumnDef::new("month", "INT").not_null(),
        ColumnDef::new("year", "INT").not_null(),
        ColumnDef::new("weekday", "INT").not_null(),
    ],
    dist_style: DistStyle::All,
};

/// Every table, in the order they are dropped and created.
pub const TABLES: [TableDef; 7] = [
    STAGING_EVENTS,
    STAGING_SONGS,
    SONGPLAYS,
    USERS,
    SONGS,
    ARTISTS,
    TIME,
];

// ── Transform statements ─────────────────────────────────────────────

/// Epoch milliseconds in `ts` to a timestamp, truncated to whole seconds.
const EVENT_START_TIME: &str = "TIMESTAMP 'epoch' + se.ts/1000 * INTERVAL '1 second'";

fn songplay_insert() -> String {
    format!(
        "INSERT INTO songplays (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)
SELECT
    {EVENT_START_TIME} AS start_time,
    se.userId AS user_id,
    se.level,
    ss.song_id,
    ss.artist_id,
    se.sessionId AS session_id,
    se.location,
    se.userAgent AS user_agent
FROM staging_events se
JOIN staging_songs ss
ON se.song = ss.title AND se.artist = ss.artist_name
WHERE se.page = 'NextSong';"
    )
}

const USER_INSERT: &str = "INSERT INTO users (user_id, first_name, last_name, gender, level)
SELECT DISTINCT
    se.userId AS user_id,
    se.firstName AS first_name,
    se.lastName AS last_name,
    se.gender,
    se.level
FROM staging_events se
WHERE se.userId IS NOT NULL;";

const SONG_INSERT: &str = "INSERT INTO songs (song_id, title, artist_id, year, duration)
SELECT DISTINCT
    ss.song_id,
    ss.title,
    ss.artist_id,
    ss.year,
    ss.duration
FROM staging_songs ss
WHERE ss.song_id IS NOT NULL;";

const ARTIST_INSERT: &str = "INSERT INTO artists (artist_id, name, location, latitude, longitude)
SELECT DISTINCT
    ss.artist_id,
    ss.artist_name AS name,
    ss.artist_location AS location,
    ss.artist_latitude AS latitude,
    ss.artist_longitude AS longitude
FROM staging_songs ss
WHERE ss.artist_id IS NOT NULL;";

// `start_time` is derived first so the extracts can reference it.
fn time_insert() -> String {
    format!(
        "INSERT INTO time (start_time, hour, day, week, month, year, weekday)
SELECT
    t.start_time,
    EXTRACT(hour FROM t.start_time),
    EXTRACT(day FROM t.start_time),
    EXTRACT(week FROM t.start_time),
    EXTRACT(month FROM t.start_time),
    EXTRACT(year FROM t.start_time),
    EXTRACT(dow FROM t.start_time)
FROM (
    SELECT DISTINCT {EVENT_START_TIME} AS start_time
    FROM staging_events se
    WHERE se.ts IS NOT NULL
) t;"
    )
}

// ── Catalog ──────────────────────────────────────────────────────────

/// One SQL statement and the label it is logged under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub label: String,
    pub sql: String,
}

impl Statement {
    fn new(label: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sql: sql.into(),
        }
    }
}

/// Where the staging tables are loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingSources {
    pub role_arn: String,
    pub log_data: String,
    pub song_data: String,
    /// JSONPaths document for the event logs.
    pub log_jsonpath: String,
    pub region: String,
}

impl StagingSources {
    pub fn new(s3: &S3Settings, role_arn: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            log_data: s3.log_data.clone(),
            song_data: s3.song_data.clone(),
            log_jsonpath: s3.log_jsonpath.clone(),
            region: s3.region.clone(),
        }
    }

    /// Read `[S3]` and the provisioned `[IAM_ROLE] arn`.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self, EtlError> {
        let s3 = S3Settings::from_config(cfg)?;
        let role = IamRoleSettings::from_config(cfg)?;
        Ok(Self::new(&s3, role.require_arn()?))
    }
}

/// Quote `value` as a SQL string literal.
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryCatalog {
    dialect: Dialect,
}

impl QueryCatalog {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn drop_statements(&self) -> Vec<Statement> {
        TABLES
            .iter()
            .map(|t| Statement::new(format!("drop {}", t.name), t.drop_sql()))
            .collect()
    }

    pub fn create_statements(&self) -> Vec<Statement> {
        TABLES
            .iter()
            .map(|t| Statement::new(format!("create {}", t.name), t.create_sql(self.dialect)))
            .collect()
    }

    /// `COPY` both staging tables from S3. Redshift only.
    pub fn copy_statements(&self, sources: &StagingSources) -> Result<Vec<Statement>, EtlError> {
        if self.dialect != Dialect::Redshift {
            return Err(EtlError::Unsupported {
                operation: "COPY from S3",
                dialect: self.dialect,
            });
        }

        let credentials = literal(&format!("aws_iam_role={}", sources.role_arn));
        let region = literal(&sources.region);
        Ok(vec![
            Statement::new(
                format!("copy {}", STAGING_EVENTS.name),
                format!(
                    "COPY {} FROM {}\nCREDENTIALS {}\nJSON {}\nCOMPUPDATE OFF REGION {};",
                    STAGING_EVENTS.name,
                    literal(&sources.log_data),
                    credentials,
                    literal(&sources.log_jsonpath),
                    region,
                ),
            ),
            Statement::new(
                format!("copy {}", STAGING_SONGS.name),
                format!(
                    "COPY {} FROM {}\nCREDENTIALS {}\nJSON 'auto'\nCOMPUPDATE OFF REGION {};",
                    STAGING_SONGS.name,
                    literal(&sources.song_data),
                    credentials,
                    region,
                ),
            ),
        ])
    }

    /// Fact table first, then the dimensions.
    pub fn insert_statements(&self) -> Vec<Statement> {
        vec![
            Statement::new(format!("insert {}", SONGPLAYS.name), songplay_insert()),
            Statement::new(format!("insert {}", USERS.name), USER_INSERT),
            Statement::new(format!("insert {}", SONGS.name), SONG_INSERT),
            Statement::new(format!("insert {}", ARTISTS.name), ARTIST_INSERT),
            Statement::new(format!("insert {}", TIME.name), time_insert()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE_NAMES: [&str; 7] = [
        "staging_events",
        "staging_songs",
        "songplays",
        "users",
        "songs",
        "artists",
        "time",
    ];

    fn sources() -> StagingSources {
        StagingSources {
            role_arn: "arn:aws:iam::123456789012:role/dwhRole".into(),
            log_data: "s3://udacity-dend/log_data".into(),
            song_data: "s3://udacity-dend/song_data".into(),
            log_jsonpath: "s3://udacity-dend/log_json_path.json".into(),
            region: "us-west-2".into(),
        }
    }

    fn create_sql(dialect: Dialect, table: &str) -> String {
        QueryCatalog::new(dialect)
            .create_statements()
            .into_iter()
            .find(|s| s.label == format!("create {table}"))
            .unwrap()
            .sql
    }

    #[test]
    fn drops_cover_all_tables_in_order() {
        let drops = QueryCatalog::default().drop_statements();
        let sql: Vec<_> = drops.iter().map(|s| s.sql.as_str()).collect();
        let expected: Vec<_> = TABLE_NAMES
            .iter()
            .map(|t| format!("DROP TABLE IF EXISTS {t};"))
            .collect();
        assert_eq!(sql, expected);
    }

    #[test]
    fn creates_are_idempotent_and_ordered() {
        for dialect in [Dialect::Redshift, Dialect::Postgres] {
            let creates = QueryCatalog::new(dialect).create_statements();
            assert_eq!(creates.len(), 7);
            for (stmt, table) in creates.iter().zip(TABLE_NAMES) {
                assert!(
                    stmt.sql.starts_with(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                    "{}",
                    stmt.sql
                );
            }
        }
    }

    #[test]
    fn redshift_ddl_carries_placement() {
        let songplays = create_sql(Dialect::Redshift, "songplays");
        assert!(songplays.contains("songplay_id INT IDENTITY(0,1) PRIMARY KEY"));
        assert!(songplays.contains("start_time TIMESTAMP NOT NULL SORTKEY"));
        assert!(songplays.contains("song_id VARCHAR(256) DISTKEY"));
        assert!(!songplays.contains("DISTSTYLE"));

        assert!(create_sql(Dialect::Redshift, "staging_events").ends_with("DISTSTYLE EVEN;"));
        assert!(create_sql(Dialect::Redshift, "users").ends_with("DISTSTYLE ALL;"));
        assert!(create_sql(Dialect::Redshift, "time").contains("start_time TIMESTAMP PRIMARY KEY SORTKEY"));
        assert!(create_sql(Dialect::Redshift, "artists").contains("name VARCHAR(256) NOT NULL SORTKEY"));
    }

    #[test]
    fn postgres_ddl_has_no_placement() {
        for stmt in QueryCatalog::new(Dialect::Postgres).create_statements() {
            for keyword in ["DISTKEY", "SORTKEY", "DISTSTYLE", "IDENTITY(0,1)"] {
                assert!(!stmt.sql.contains(keyword), "{}: {keyword}", stmt.label);
            }
        }
        assert!(create_sql(Dialect::Postgres, "songplays")
            .contains("songplay_id INT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"));
    }

    #[test]
    fn copy_statements_embed_role_and_sources() {
        let copies = QueryCatalog::new(Dialect::Redshift)
            .copy_statements(&sources())
            .unwrap();
        assert_eq!(copies.len(), 2);

        let events = &copies[0].sql;
        assert!(events.starts_with("COPY staging_events FROM 's3://udacity-dend/log_data'"));
        assert!(events.contains("CREDENTIALS 'aws_iam_role=arn:aws:iam::123456789012:role/dwhRole'"));
        assert!(events.contains("JSON 's3://udacity-dend/log_json_path.json'"));
        assert!(events.contains("REGION 'us-west-2'"));

        let songs = &copies[1].sql;
        assert!(songs.starts_with("COPY staging_songs FROM 's3://udacity-dend/song_data'"));
        assert!(songs.contains("JSON 'auto'"));
    }

    #[test]
    fn copy_escapes_literals() {
        let mut src = sources();
        src.log_data = "s3://bucket/it's".into();
        let copies = QueryCatalog::new(Dialect::Redshift)
            .copy_statements(&src)
            .unwrap();
        assert!(copies[0].sql.contains("FROM 's3://bucket/it''s'"));
    }

    #[test]
    fn copy_is_redshift_only() {
        let err = QueryCatalog::new(Dialect::Postgres)
            .copy_statements(&sources())
            .unwrap_err();
        assert!(matches!(
            err,
            EtlError::Unsupported {
                dialect: Dialect::Postgres,
                ..
            }
        ));
    }

    #[test]
    fn inserts_run_fact_table_first() {
        let labels: Vec<_> = QueryCatalog::default()
            .insert_statements()
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(
            labels,
            [
                "insert songplays",
                "insert users",
                "insert songs",
                "insert artists",
                "insert time"
            ]
        );
    }

    #[test]
    fn songplay_insert_joins_on_title_and_artist() {
        let sql = songplay_insert();
        assert!(sql.contains("ON se.song = ss.title AND se.artist = ss.artist_name"));
        assert!(sql.contains("WHERE se.page = 'NextSong'"));
        assert!(sql.contains("TIMESTAMP 'epoch' + se.ts/1000 * INTERVAL '1 second' AS start_time"));
    }

    #[test]
    fn time_insert_extracts_from_derived_start_time() {
        let sql = time_insert();
        for part in ["hour", "day", "week", "month", "year", "dow"] {
            assert!(sql.contains(&format!("EXTRACT({part} FROM t.start_time)")), "{part}");
        }
        assert!(sql.contains("SELECT DISTINCT TIMESTAMP 'epoch'"));
    }

    #[test]
    fn staging_sources_need_provisioned_arn() {
        let mut cfg = ConfigFile::parse(
            "[IAM_ROLE]\nrole_name = \"dwhRole\"\n\n[S3]\nlog_jsonpath = \"s3://b/paths.json\"\n",
        )
        .unwrap();
        assert!(matches!(
            StagingSources::from_config(&cfg),
            Err(EtlError::Config(_))
        ));

        cfg.set("IAM_ROLE", "arn", "arn:aws:iam::1:role/dwhRole");
        let src = StagingSources::from_config(&cfg).unwrap();
        assert_eq!(src.role_arn, "arn:aws:iam::1:role/dwhRole");
        assert_eq!(src.log_data, "s3://udacity-dend/log_data");
    }

    #[test]
    fn dialect_parsing() {
        assert_eq!("Redshift".parse::<Dialect>().unwrap(), Dialect::Redshift);
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert!("mysql".parse::<Dialect>().is_err());
    }
}
