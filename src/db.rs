use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "degreetrack.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS programs(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            institution TEXT,
            target_grade REAL,
            total_credits_required INTEGER NOT NULL DEFAULT 360,
            status TEXT NOT NULL DEFAULT 'in_progress',
            start_date TEXT,
            end_date TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS modules(
            id TEXT PRIMARY KEY,
            program_id TEXT NOT NULL,
            code TEXT,
            name TEXT NOT NULL,
            credits INTEGER NOT NULL DEFAULT 10,
            weighting REAL,
            status TEXT NOT NULL DEFAULT 'upcoming',
            semester INTEGER,
            academic_year TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(program_id) REFERENCES programs(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_modules_program ON modules(program_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS coursework(
            id TEXT PRIMARY KEY,
            module_id TEXT NOT NULL,
            name TEXT NOT NULL,
            weighting REAL NOT NULL,
            max_marks REAL NOT NULL DEFAULT 100,
            achieved_marks REAL,
            deadline TEXT,
            status TEXT NOT NULL DEFAULT 'not_started',
            submitted_at TEXT,
            graded_at TEXT,
            feedback TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(module_id) REFERENCES modules(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_coursework_module ON coursework(module_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lectures(
            id TEXT PRIMARY KEY,
            module_id TEXT NOT NULL,
            title TEXT NOT NULL,
            location TEXT,
            day_of_week INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            recurrence_start_date TEXT NOT NULL,
            recurrence_end_date TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(module_id) REFERENCES modules(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lectures_module ON lectures(module_id)",
        [],
    )?;

    // Early workspaces predate grading feedback and lecture notes. Add the
    // columns when opening an old database.
    ensure_coursework_feedback(&conn)?;
    ensure_lectures_notes(&conn)?;

    Ok(conn)
}

fn ensure_coursework_feedback(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "coursework", "feedback")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE coursework ADD COLUMN feedback TEXT", [])?;
    Ok(())
}

fn ensure_lectures_notes(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "lectures", "notes")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE lectures ADD COLUMN notes TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
