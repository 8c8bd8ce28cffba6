//! Database schema definitions for the genealogy tables

/// SQL to create the country table
pub const CREATE_COUNTRY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS country (
    country_id INTEGER PRIMARY KEY,
    country_name TEXT NOT NULL
)
"#;

/// SQL to create the university table
pub const CREATE_UNIVERSITY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS university (
    university_id INTEGER PRIMARY KEY,
    university_name TEXT NOT NULL,
    country_id INTEGER REFERENCES country(country_id)
)
"#;

/// SQL to create the mathematics_subject_classification table
pub const CREATE_SUBJECT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS mathematics_subject_classification (
    subject_code INTEGER PRIMARY KEY,
    subject_name TEXT NOT NULL
)
"#;

/// SQL to create the dissertation table
pub const CREATE_DISSERTATION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS dissertation (
    dissertation_id INTEGER PRIMARY KEY,
    dissertation_title TEXT,
    dissertation_year INTEGER,
    subject_id INTEGER REFERENCES mathematics_subject_classification(subject_code),
    university_id INTEGER REFERENCES university(university_id)
)
"#;

/// SQL to create the mathematician table
pub const CREATE_MATHEMATICIAN_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS mathematician (
    mathematician_id INTEGER PRIMARY KEY,
    mathematician_name TEXT,
    birth_date TEXT,
    death_date TEXT,
    dissertation_id INTEGER REFERENCES dissertation(dissertation_id)
)
"#;

/// SQL to create the advisor_relationship table (no simple primary key;
/// identity is the advisor/advisee pair)
pub const CREATE_ADVISOR_RELATIONSHIP_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS advisor_relationship (
    advisor_id INTEGER NOT NULL REFERENCES mathematician(mathematician_id),
    advisee_id INTEGER NOT NULL REFERENCES mathematician(mathematician_id),
    university_id INTEGER REFERENCES university(university_id)
)
"#;

/// SQL to create the web_source table
pub const CREATE_WEB_SOURCE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS web_source (
    web_source_id INTEGER PRIMARY KEY,
    base_url TEXT NOT NULL
)
"#;

/// SQL to create the webpage table
pub const CREATE_WEBPAGE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS webpage (
    webpage_id INTEGER PRIMARY KEY,
    web_source_id INTEGER REFERENCES web_source(web_source_id),
    path TEXT NOT NULL,
    query TEXT,
    timestamp TEXT
)
"#;

/// SQL to create the math_genealogy_associated_link table
pub const CREATE_ASSOCIATED_LINK_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS math_genealogy_associated_link (
    mathematician_id INTEGER NOT NULL REFERENCES mathematician(mathematician_id),
    webpage_id INTEGER REFERENCES webpage(webpage_id),
    href_text TEXT
)
"#;

/// SQL to create indexes; unique indexes back the declared alternate keys
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_country_name ON country(country_name)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_university_name_country ON university(university_name, country_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_subject_name ON mathematics_subject_classification(subject_name)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_advisor_pair ON advisor_relationship(advisor_id, advisee_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_web_source_url ON web_source(base_url)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_webpage_location ON webpage(web_source_id, path, query)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_link_identity ON math_genealogy_associated_link(mathematician_id, webpage_id, href_text)",
    "CREATE INDEX IF NOT EXISTS idx_dissertation_university ON dissertation(university_id)",
    "CREATE INDEX IF NOT EXISTS idx_advisor_advisee ON advisor_relationship(advisee_id)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_COUNTRY_TABLE,
        CREATE_UNIVERSITY_TABLE,
        CREATE_SUBJECT_TABLE,
        CREATE_DISSERTATION_TABLE,
        CREATE_MATHEMATICIAN_TABLE,
        CREATE_ADVISOR_RELATIONSHIP_TABLE,
        CREATE_WEB_SOURCE_TABLE,
        CREATE_WEBPAGE_TABLE,
        CREATE_ASSOCIATED_LINK_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
