//! The per-database capability record.
//!
//! Every supported database is one [`Dialect`] value built by a preset
//! function. The load layer only talks to this record: type names, limit
//! handling, lock rendering, join and case fragments, callable result sets
//! and identifier generation strings.

use tracing::trace;

use crate::case::{CaseFragment, CaseStyle};
use crate::error::{Error, Result};
use crate::functions::{FunctionRegistry, SqlFunction};
use crate::join::{JoinFragment, JoinStyle};
use crate::limit::{use_limit, LimitHandler, LimitStyle, RowSelection};
use crate::lock::{LockOptions, LockSyntax, WaitStyle};
use crate::types::{SqlTypeCode, TypeNames, DEFAULT_LENGTH, DEFAULT_PRECISION, DEFAULT_SCALE};

/// Default maximum length of generated alias roots.
pub const DEFAULT_MAX_ALIAS_LENGTH: usize = 10;

/// Identity column support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySupport {
    /// Query returning the last generated value. `{table}` and `{column}`
    /// are substituted.
    pub select_string: &'static str,
    /// Column definition suffix.
    pub column_string: &'static str,
}

/// How a stored procedure returns its result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableResultSets {
    Unsupported,
    /// The first parameter is an out parameter of this type holding a cursor.
    OutParameter(SqlTypeCode),
}

/// Capability record for one database.
#[derive(Debug, Clone)]
pub struct Dialect {
    name: &'static str,
    type_names: TypeNames,
    limit: LimitHandler,
    lock: LockSyntax,
    join_style: JoinStyle,
    case_style: CaseStyle,
    callable: CallableResultSets,
    identity: Option<IdentitySupport>,
    /// Query template for the next sequence value, `{sequence}` substituted.
    sequence_next_value: Option<&'static str>,
    open_quote: char,
    close_quote: char,
    max_alias_length: usize,
    functions: FunctionRegistry,
}

impl Dialect {
    fn base(name: &'static str) -> Self {
        Self {
            name,
            type_names: standard_type_names(),
            limit: LimitHandler::noop(),
            lock: LockSyntax::for_update(),
            join_style: JoinStyle::Ansi,
            case_style: CaseStyle::Ansi,
            callable: CallableResultSets::Unsupported,
            identity: None,
            sequence_next_value: None,
            open_quote: '"',
            close_quote: '"',
            max_alias_length: DEFAULT_MAX_ALIAS_LENGTH,
            functions: FunctionRegistry::standard().clone(),
        }
    }

    /// Generic ANSI SQL: no pagination, `for update` locking.
    pub fn ansi() -> Self {
        Self::base("ansi")
    }

    pub fn h2() -> Self {
        Self {
            limit: LimitHandler::new(LimitStyle::LimitOffset),
            identity: Some(IdentitySupport {
                select_string: "call identity()",
                column_string: "generated by default as identity",
            }),
            sequence_next_value: Some("call next value for {sequence}"),
            type_names: standard_type_names()
                .with(SqlTypeCode::Boolean, "boolean")
                .with(SqlTypeCode::Clob, "clob"),
            ..Self::base("h2")
        }
    }

    pub fn postgres() -> Self {
        Self {
            limit: LimitHandler::new(LimitStyle::LimitOffset),
            lock: LockSyntax {
                for_update: " for update",
                for_read: " for share",
                no_wait: Some(" nowait"),
                skip_locked: Some(" skip locked"),
                wait: WaitStyle::Unsupported,
                table_hints: false,
            },
            callable: CallableResultSets::OutParameter(SqlTypeCode::RefCursor),
            identity: Some(IdentitySupport {
                select_string: "select currval('{table}_{column}_seq')",
                column_string: "serial not null",
            }),
            sequence_next_value: Some("select nextval ('{sequence}')"),
            type_names: standard_type_names()
                .with(SqlTypeCode::Boolean, "boolean")
                .with(SqlTypeCode::Double, "float8")
                .with(SqlTypeCode::Blob, "oid")
                .with(SqlTypeCode::Clob, "text")
                .with(SqlTypeCode::VarBinary, "bytea")
                .with(SqlTypeCode::LongVarchar, "text"),
            functions: FunctionRegistry::standard()
                .clone()
                .with(SqlFunction::standard("now", Some(SqlTypeCode::Timestamp))),
            ..Self::base("postgres")
        }
    }

    pub fn mysql() -> Self {
        Self {
            limit: LimitHandler::new(LimitStyle::LimitCommaOffset),
            lock: LockSyntax {
                for_update: " for update",
                for_read: " lock in share mode",
                no_wait: None,
                skip_locked: None,
                wait: WaitStyle::Unsupported,
                table_hints: false,
            },
            identity: Some(IdentitySupport {
                select_string: "select last_insert_id()",
                column_string: "not null auto_increment",
            }),
            open_quote: '`',
            close_quote: '`',
            type_names: standard_type_names()
                .with(SqlTypeCode::Boolean, "bit")
                .with(SqlTypeCode::Timestamp, "datetime")
                .with(SqlTypeCode::Clob, "longtext")
                .with(SqlTypeCode::Blob, "longblob"),
            ..Self::base("mysql")
        }
    }

    pub fn sqlite() -> Self {
        Self {
            limit: LimitHandler::new(LimitStyle::LimitOffset),
            lock: LockSyntax::unsupported(),
            identity: Some(IdentitySupport {
                select_string: "select last_insert_rowid()",
                column_string: "integer",
            }),
            type_names: TypeNames::new()
                .with(SqlTypeCode::Boolean, "integer")
                .with(SqlTypeCode::SmallInt, "smallint")
                .with(SqlTypeCode::Integer, "integer")
                .with(SqlTypeCode::BigInt, "bigint")
                .with(SqlTypeCode::Float, "float")
                .with(SqlTypeCode::Double, "double")
                .with(SqlTypeCode::Numeric, "numeric")
                .with(SqlTypeCode::Decimal, "decimal")
                .with(SqlTypeCode::Char, "char")
                .with(SqlTypeCode::Varchar, "varchar")
                .with(SqlTypeCode::LongVarchar, "longvarchar")
                .with(SqlTypeCode::Date, "date")
                .with(SqlTypeCode::Time, "time")
                .with(SqlTypeCode::Timestamp, "timestamp")
                .with(SqlTypeCode::Binary, "blob")
                .with(SqlTypeCode::VarBinary, "blob")
                .with(SqlTypeCode::Blob, "blob")
                .with(SqlTypeCode::Clob, "clob"),
            ..Self::base("sqlite")
        }
    }

    pub fn oracle() -> Self {
        Self {
            limit: LimitHandler::new(LimitStyle::RowNum),
            lock: LockSyntax {
                for_update: " for update",
                for_read: " for update",
                no_wait: Some(" nowait"),
                skip_locked: Some(" skip locked"),
                wait: WaitStyle::Seconds,
                table_hints: false,
            },
            join_style: JoinStyle::OracleTheta,
            case_style: CaseStyle::Nvl2,
            callable: CallableResultSets::OutParameter(SqlTypeCode::RefCursor),
            sequence_next_value: Some("select {sequence}.nextval from dual"),
            type_names: standard_type_names()
                .with(SqlTypeCode::Boolean, "number(1,0)")
                .with(SqlTypeCode::SmallInt, "number(5,0)")
                .with(SqlTypeCode::Integer, "number(10,0)")
                .with(SqlTypeCode::BigInt, "number(19,0)")
                .with(SqlTypeCode::Varchar, "long")
                .with_sized(SqlTypeCode::Varchar, 4000, "varchar2($l char)")
                .with(SqlTypeCode::Timestamp, "timestamp")
                .with(SqlTypeCode::Double, "double precision"),
            functions: FunctionRegistry::standard()
                .clone()
                .with(SqlFunction::no_args("sysdate", SqlTypeCode::Timestamp))
                .with(SqlFunction::no_args("rownum", SqlTypeCode::BigInt))
                .with(SqlFunction::standard("nvl", None))
                .with(SqlFunction::standard("nvl2", None)),
            ..Self::base("oracle")
        }
    }

    pub fn sql_server() -> Self {
        Self {
            limit: LimitHandler::new(LimitStyle::Top),
            lock: LockSyntax {
                table_hints: true,
                ..LockSyntax::unsupported()
            },
            identity: Some(IdentitySupport {
                select_string: "select scope_identity()",
                column_string: "identity not null",
            }),
            open_quote: '[',
            close_quote: ']',
            type_names: standard_type_names()
                .with(SqlTypeCode::Boolean, "bit")
                .with(SqlTypeCode::Timestamp, "datetime")
                .with(SqlTypeCode::Clob, "varchar(max)")
                .with(SqlTypeCode::Blob, "varbinary(max)"),
            functions: FunctionRegistry::standard()
                .clone()
                .with(SqlFunction::standard("getdate", Some(SqlTypeCode::Timestamp))),
            ..Self::base("sql_server")
        }
    }

    /// Look up a preset by configuration name.
    pub fn by_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "ansi" | "generic" => Ok(Self::ansi()),
            "h2" => Ok(Self::h2()),
            "postgres" | "postgresql" => Ok(Self::postgres()),
            "mysql" => Ok(Self::mysql()),
            "sqlite" => Ok(Self::sqlite()),
            "oracle" => Ok(Self::oracle()),
            "sql_server" | "sqlserver" | "mssql" => Ok(Self::sql_server()),
            _ => Err(Error::UnknownDialect(name.to_string())),
        }
    }

    /// Replace the pagination style.
    pub fn with_limit_style(mut self, style: LimitStyle) -> Self {
        self.limit = LimitHandler::new(style);
        self
    }

    /// Replace the lock rendering.
    pub fn with_lock_syntax(mut self, lock: LockSyntax) -> Self {
        self.lock = lock;
        self
    }

    /// Replace the callable result-set support.
    pub fn with_callable_result_sets(mut self, callable: CallableResultSets) -> Self {
        self.callable = callable;
        self
    }

    /// Replace the maximum alias root length.
    pub fn with_max_alias_length(mut self, length: usize) -> Self {
        self.max_alias_length = length;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_names(&self) -> &TypeNames {
        &self.type_names
    }

    /// Column type for a type code with default size.
    pub fn type_name(&self, code: SqlTypeCode) -> Result<String> {
        self.type_names
            .get(code, DEFAULT_LENGTH, DEFAULT_PRECISION, DEFAULT_SCALE)
    }

    /// Column type for a type code and explicit size.
    pub fn sized_type_name(&self, code: SqlTypeCode, length: u64, precision: u32, scale: u32) -> Result<String> {
        self.type_names.get(code, length, precision, scale)
    }

    /// The dialect's native pagination handler.
    pub fn limit_handler(&self) -> LimitHandler {
        self.limit
    }

    /// Handler to use for this selection, no-op when pagination is not
    /// requested or not supported.
    pub fn build_limit_handler(&self, selection: Option<&RowSelection>) -> LimitHandler {
        if use_limit(&self.limit, selection) {
            self.limit
        } else {
            trace!(dialect = self.name, "using no-op limit handler");
            LimitHandler::noop()
        }
    }

    pub fn lock_syntax(&self) -> &LockSyntax {
        &self.lock
    }

    /// Trailing lock clause, empty when no lock is requested.
    pub fn for_update_string(&self, options: &LockOptions) -> String {
        self.lock.for_update_string(options)
    }

    /// Decorate `table alias` with a lock hint for dialects using hints.
    pub fn append_lock_hint(&self, options: &LockOptions, alias: &str, table_with_alias: &str) -> String {
        self.lock
            .append_lock_hint(options.effective_lock_mode(alias), options.timeout, table_with_alias)
    }

    pub fn supports_lock_timeouts(&self) -> bool {
        self.lock.supports_lock_timeouts()
    }

    pub fn is_lock_timeout_parameterized(&self) -> bool {
        self.lock.is_lock_timeout_parameterized()
    }

    pub fn create_outer_join_fragment(&self) -> JoinFragment {
        JoinFragment::new(self.join_style)
    }

    pub fn create_case_fragment(&self) -> CaseFragment {
        CaseFragment::new(self.case_style)
    }

    /// Type to register for the result-set out parameter of a callable
    /// statement.
    pub fn result_set_out_parameter_type(&self) -> Result<SqlTypeCode> {
        match self.callable {
            CallableResultSets::OutParameter(code) => Ok(code),
            CallableResultSets::Unsupported => {
                Err(Error::unsupported(self.name, "callable statement result sets"))
            }
        }
    }

    pub fn supports_identity_columns(&self) -> bool {
        self.identity.is_some()
    }

    /// Query returning the identity value generated for `table.column`.
    pub fn identity_select_string(&self, table: &str, column: &str) -> Result<String> {
        let identity = self
            .identity
            .as_ref()
            .ok_or_else(|| Error::unsupported(self.name, "identity columns"))?;
        Ok(identity
            .select_string
            .replace("{table}", table)
            .replace("{column}", column))
    }

    /// Column definition suffix for identity columns.
    pub fn identity_column_string(&self) -> Result<&'static str> {
        self.identity
            .as_ref()
            .map(|identity| identity.column_string)
            .ok_or_else(|| Error::unsupported(self.name, "identity columns"))
    }

    pub fn supports_sequences(&self) -> bool {
        self.sequence_next_value.is_some()
    }

    /// Query returning the next value of a sequence.
    pub fn sequence_next_value_string(&self, sequence: &str) -> Result<String> {
        self.sequence_next_value
            .map(|template| template.replace("{sequence}", sequence))
            .ok_or_else(|| Error::unsupported(self.name, "sequences"))
    }

    /// Quote an identifier.
    pub fn quote(&self, identifier: &str) -> String {
        format!("{}{}{}", self.open_quote, identifier, self.close_quote)
    }

    /// Turn a backtick-quoted mapping identifier into the dialect's quoting.
    pub fn quote_mapped(&self, identifier: &str) -> String {
        match identifier
            .strip_prefix('`')
            .and_then(|rest| rest.strip_suffix('`'))
        {
            Some(inner) => self.quote(inner),
            None => identifier.to_string(),
        }
    }

    pub fn max_alias_length(&self) -> usize {
        self.max_alias_length
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::ansi()
    }
}

fn standard_type_names() -> TypeNames {
    TypeNames::new()
        .with(SqlTypeCode::Boolean, "bit")
        .with(SqlTypeCode::SmallInt, "smallint")
        .with(SqlTypeCode::Integer, "integer")
        .with(SqlTypeCode::BigInt, "bigint")
        .with(SqlTypeCode::Float, "float")
        .with(SqlTypeCode::Double, "double precision")
        .with(SqlTypeCode::Numeric, "numeric($p,$s)")
        .with(SqlTypeCode::Decimal, "decimal($p,$s)")
        .with(SqlTypeCode::Char, "char(1)")
        .with(SqlTypeCode::Varchar, "varchar($l)")
        .with(SqlTypeCode::LongVarchar, "longvarchar")
        .with(SqlTypeCode::Date, "date")
        .with(SqlTypeCode::Time, "time")
        .with(SqlTypeCode::Timestamp, "timestamp")
        .with(SqlTypeCode::Binary, "binary($l)")
        .with(SqlTypeCode::VarBinary, "varbinary($l)")
        .with(SqlTypeCode::Blob, "blob")
        .with(SqlTypeCode::Clob, "clob")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{LockMode, LockTimeout};

    #[test]
    fn test_by_name() {
        assert_eq!(Dialect::by_name("PostgreSQL").unwrap().name(), "postgres");
        assert_eq!(Dialect::by_name("sql-server").unwrap().name(), "sql_server");
        assert_eq!(
            Dialect::by_name("db2").unwrap_err(),
            Error::UnknownDialect("db2".to_string())
        );
    }

    #[test]
    fn test_type_names() {
        let postgres = Dialect::postgres();
        assert_eq!(postgres.type_name(SqlTypeCode::Varchar).unwrap(), "varchar(255)");
        assert_eq!(postgres.type_name(SqlTypeCode::Boolean).unwrap(), "boolean");
        assert_eq!(
            postgres.sized_type_name(SqlTypeCode::Numeric, 0, 12, 4).unwrap(),
            "numeric(12,4)"
        );

        let oracle = Dialect::oracle();
        assert_eq!(
            oracle.sized_type_name(SqlTypeCode::Varchar, 100, 0, 0).unwrap(),
            "varchar2(100 char)"
        );
        assert_eq!(
            oracle.sized_type_name(SqlTypeCode::Varchar, 5000, 0, 0).unwrap(),
            "long"
        );
        assert!(oracle.type_name(SqlTypeCode::RefCursor).is_err());
    }

    #[test]
    fn test_build_limit_handler_falls_back_to_noop() {
        let ansi = Dialect::ansi();
        assert!(!ansi
            .build_limit_handler(Some(&RowSelection::limit(10)))
            .supports_limit());

        let postgres = Dialect::postgres();
        assert!(!postgres.build_limit_handler(None).supports_limit());
        assert!(postgres
            .build_limit_handler(Some(&RowSelection::limit(10)))
            .supports_limit());
    }

    #[test]
    fn test_lock_rendering() {
        let options = LockOptions::new(LockMode::PessimisticWrite).with_timeout(LockTimeout::Millis(3000));
        assert_eq!(Dialect::oracle().for_update_string(&options), " for update wait 3");
        assert_eq!(Dialect::postgres().for_update_string(&options), " for update");
        assert!(!Dialect::postgres().supports_lock_timeouts());
        assert_eq!(Dialect::sqlite().for_update_string(&options), "");

        let sql_server = Dialect::sql_server();
        assert_eq!(sql_server.for_update_string(&options), "");
        assert_eq!(
            sql_server.append_lock_hint(&options, "user0_", "users user0_"),
            "users user0_ with (updlock, rowlock)"
        );
    }

    #[test]
    fn test_callable_support() {
        assert_eq!(
            Dialect::oracle().result_set_out_parameter_type().unwrap(),
            SqlTypeCode::RefCursor
        );
        assert!(matches!(
            Dialect::mysql().result_set_out_parameter_type(),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn test_identifier_generation_strings() {
        assert_eq!(
            Dialect::postgres().identity_select_string("users", "id").unwrap(),
            "select currval('users_id_seq')"
        );
        assert_eq!(
            Dialect::oracle().sequence_next_value_string("user_seq").unwrap(),
            "select user_seq.nextval from dual"
        );
        assert!(Dialect::oracle().identity_select_string("users", "id").is_err());
        assert!(Dialect::mysql().sequence_next_value_string("s").is_err());
        assert_eq!(Dialect::sqlite().identity_column_string().unwrap(), "integer");
    }

    #[test]
    fn test_quoting() {
        assert_eq!(Dialect::mysql().quote_mapped("`order`"), "`order`");
        assert_eq!(Dialect::sql_server().quote_mapped("`order`"), "[order]");
        assert_eq!(Dialect::postgres().quote_mapped("name"), "name");
    }
}
