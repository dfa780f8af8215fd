/// Column layout of the image table.
///
/// The store never hardcodes table or column names; it receives a `Schema`
/// at construction and builds every statement from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub table: String,
    pub path_column: String,
    pub feature_column: String,
    pub date_column: String,
    /// Maximum length of the path primary key
    pub path_max_len: usize,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            table: "image".to_string(),
            path_column: "image_path".to_string(),
            feature_column: "image_feature".to_string(),
            date_column: "date".to_string(),
            path_max_len: 255,
        }
    }
}

impl Schema {
    /// DDL creating the table when it does not exist yet.
    ///
    /// Valid for both MySQL and SQLite.
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             {path} VARCHAR({len}) NOT NULL PRIMARY KEY, \
             {feature} TEXT NULL, \
             {date} DATE NULL)",
            table = self.table,
            path = self.path_column,
            len = self.path_max_len,
            feature = self.feature_column,
            date = self.date_column,
        )
    }

    /// Select every row. The date is cast to text so both backends return
    /// it as a character column.
    pub fn select_all_sql(&self) -> String {
        format!(
            "SELECT {path} AS path, {feature} AS feature, CAST({date} AS CHAR) AS captured_at \
             FROM {table} ORDER BY {path}",
            table = self.table,
            path = self.path_column,
            feature = self.feature_column,
            date = self.date_column,
        )
    }

    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {table} ({path}) VALUES (?)",
            table = self.table,
            path = self.path_column,
        )
    }

    pub fn update_feature_sql(&self) -> String {
        format!(
            "UPDATE {table} SET {feature} = ? WHERE {path} = ?",
            table = self.table,
            feature = self.feature_column,
            path = self.path_column,
        )
    }

    pub fn update_date_sql(&self) -> String {
        format!(
            "UPDATE {table} SET {date} = ? WHERE {path} = ?",
            table = self.table,
            date = self.date_column,
            path = self.path_column,
        )
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) AS count FROM {}", self.table)
    }
}
