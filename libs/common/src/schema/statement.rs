//! Typed schema statements and their PostgreSQL rendering

use std::fmt::Write;

/// Column types used by the application schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SqlType {
    Serial,
    Integer,
    Text,
    Numeric,
    TextArray,
    Date,
    Time,
    Timestamptz,
}

impl SqlType {
    pub fn as_sql(self) -> &'static str {
        match self {
            SqlType::Serial => "SERIAL",
            SqlType::Integer => "INTEGER",
            SqlType::Text => "TEXT",
            SqlType::Numeric => "NUMERIC",
            SqlType::TextArray => "TEXT[]",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Timestamptz => "TIMESTAMPTZ",
        }
    }
}

/// Column default expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DefaultValue {
    /// A string literal
    Text(&'static str),
    /// `NOW()`
    Now,
    /// `'{}'`
    EmptyArray,
}

impl DefaultValue {
    pub fn as_sql(self) -> String {
        match self {
            DefaultValue::Text(value) => quote_literal(value),
            DefaultValue::Now => "NOW()".to_string(),
            DefaultValue::EmptyArray => "'{}'".to_string(),
        }
    }
}

/// Referential action on delete of the referenced row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    SetNull,
    Cascade,
}

impl OnDelete {
    fn as_sql(self) -> &'static str {
        match self {
            OnDelete::SetNull => "SET NULL",
            OnDelete::Cascade => "CASCADE",
        }
    }
}

/// Foreign key target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct References {
    pub table: &'static str,
    pub column: &'static str,
    pub on_delete: OnDelete,
}

/// Column definition, built with the `const` helpers below
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub primary_key: bool,
    pub unique: bool,
    pub not_null: bool,
    pub default: Option<DefaultValue>,
    /// Allowed values for a `CHECK (col IN (...))` constraint; empty for none
    pub check_in: &'static [&'static str],
    pub references: Option<References>,
}

impl ColumnDef {
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            primary_key: false,
            unique: false,
            not_null: false,
            default: None,
            check_in: &[],
            references: None,
        }
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub const fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    pub const fn check_in(mut self, values: &'static [&'static str]) -> Self {
        self.check_in = values;
        self
    }

    pub const fn references(
        mut self,
        table: &'static str,
        column: &'static str,
        on_delete: OnDelete,
    ) -> Self {
        self.references = Some(References {
            table,
            column,
            on_delete,
        });
        self
    }

    /// Render the column as it appears in `CREATE TABLE` or `ADD COLUMN`
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type.as_sql());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = self.default {
            let _ = write!(sql, " DEFAULT {}", default.as_sql());
        }
        if !self.check_in.is_empty() {
            let allowed: Vec<String> = self.check_in.iter().map(|v| quote_literal(v)).collect();
            let _ = write!(sql, " CHECK ({} IN ({}))", self.name, allowed.join(","));
        }
        if let Some(target) = self.references {
            let _ = write!(
                sql,
                " REFERENCES {}({}) ON DELETE {}",
                target.table,
                target.column,
                target.on_delete.as_sql()
            );
        }
        sql
    }
}

/// Table definition in its initial (creation-time) shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: Vec<ColumnDef>,
}

/// A single idempotent-when-guarded schema change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `CREATE TABLE IF NOT EXISTS`
    CreateTable(TableDef),
    AddColumn {
        table: &'static str,
        column: ColumnDef,
    },
    /// `UPDATE table SET column = value WHERE column IS NULL`
    FillNulls {
        table: &'static str,
        column: &'static str,
        value: &'static str,
    },
    /// Split a legacy full-name column into first/last name on rows whose
    /// first name is still unset
    SplitLegacyName {
        table: &'static str,
        source: &'static str,
        first: &'static str,
        last: &'static str,
    },
    SetDefault {
        table: &'static str,
        column: &'static str,
        value: DefaultValue,
    },
    SetNotNull {
        table: &'static str,
        column: &'static str,
    },
    DropColumn {
        table: &'static str,
        column: &'static str,
    },
    AddForeignKey {
        table: &'static str,
        name: &'static str,
        column: &'static str,
        references: References,
    },
    /// `CREATE INDEX IF NOT EXISTS`
    CreateIndex {
        name: &'static str,
        table: &'static str,
        column: &'static str,
    },
}

impl Statement {
    /// Render the statement as a single PostgreSQL command
    pub fn to_sql(&self) -> String {
        match self {
            Statement::CreateTable(table) => {
                let columns: Vec<String> = table.columns.iter().map(ColumnDef::to_sql).collect();
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
                    table.name,
                    columns.join(",\n  ")
                )
            }
            Statement::AddColumn { table, column } => {
                format!("ALTER TABLE {} ADD COLUMN {}", table, column.to_sql())
            }
            Statement::FillNulls {
                table,
                column,
                value,
            } => format!(
                "UPDATE {table} SET {column} = {} WHERE {column} IS NULL",
                quote_literal(value)
            ),
            Statement::SplitLegacyName {
                table,
                source,
                first,
                last,
            } => {
                let trimmed = format!("btrim({source})");
                let space = format!("strpos({trimmed}, ' ')");
                format!(
                    "UPDATE {table} SET \
                     {first} = CASE WHEN {space} > 0 THEN left({trimmed}, {space} - 1) \
                     ELSE COALESCE({trimmed}, '') END, \
                     {last} = COALESCE({last}, CASE WHEN {space} > 0 \
                     THEN substr({trimmed}, {space} + 1) ELSE '' END) \
                     WHERE {first} IS NULL"
                )
            }
            Statement::SetDefault {
                table,
                column,
                value,
            } => format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                table,
                column,
                value.as_sql()
            ),
            Statement::SetNotNull { table, column } => {
                format!("ALTER TABLE {} ALTER COLUMN {} SET NOT NULL", table, column)
            }
            Statement::DropColumn { table, column } => {
                format!("ALTER TABLE {} DROP COLUMN {}", table, column)
            }
            Statement::AddForeignKey {
                table,
                name,
                column,
                references,
            } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {}",
                table,
                name,
                column,
                references.table,
                references.column,
                references.on_delete.as_sql()
            ),
            Statement::CreateIndex {
                name,
                table,
                column,
            } => format!("CREATE INDEX IF NOT EXISTS {} ON {}({})", name, table, column),
        }
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
