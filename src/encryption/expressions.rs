//! Per-dialect SQL for column encryption, decryption and hashing.
//!
//! Keys never appear in statement text: every expression reads its key from a session
//! variable published with [`super::keys::session_key_statement`].

use crate::types::DatabaseType;

/// `DBMS_CRYPTO.ENCRYPT_AES256 + CHAIN_CBC + PAD_PKCS5`.
pub const ORACLE_AES256_CBC_PKCS5: u32 = 4360;
/// `DBMS_CRYPTO.HASH_SH256`.
pub const ORACLE_HASH_SH256: u32 = 4;

/// Split `app.encryption_key` into the Oracle context namespace and attribute
/// (`APP_CTX`, `encryption_key`). Keys without a dot live in `APP_CTX`.
#[must_use]
pub fn oracle_context(key: &str) -> (String, String) {
    match key.split_once('.') {
        Some((namespace, attribute)) => (
            format!("{}_CTX", namespace.to_uppercase()),
            attribute.to_string(),
        ),
        None => ("APP_CTX".to_string(), key.to_string()),
    }
}

/// MariaDB user variable holding a session key: dots become underscores.
#[must_use]
pub fn mariadb_variable(key: &str) -> String {
    format!("@{}", key.replace('.', "_"))
}

/// MariaDB stored function returning the user variable of `key`. Views may not read user
/// variables (error 1351), so decrypting views call this instead.
#[must_use]
pub fn mariadb_key_function(key: &str) -> String {
    format!("session_key_{}", key.replace('.', "_"))
}

/// `CREATE FUNCTION` for [`mariadb_key_function`], under the given (possibly schema-qualified)
/// name.
#[must_use]
pub fn mariadb_key_function_ddl(name: &str, key: &str) -> String {
    format!(
        "CREATE FUNCTION IF NOT EXISTS {name}() RETURNS VARCHAR(1024) NOT DETERMINISTIC NO SQL RETURN {};\n",
        mariadb_variable(key)
    )
}

/// SQL reading the session key `key` in the current session.
#[must_use]
pub fn session_key_expr(db: DatabaseType, key: &str) -> String {
    match db {
        DatabaseType::Postgres => format!("current_setting('{key}')"),
        DatabaseType::Mssql => format!("CAST(SESSION_CONTEXT(N'{key}') AS NVARCHAR(MAX))"),
        DatabaseType::Oracle => {
            let (namespace, attribute) = oracle_context(key);
            format!("SYS_CONTEXT('{namespace}', '{attribute}')")
        }
        DatabaseType::MariaDb => mariadb_variable(key),
    }
}

#[must_use]
pub fn encrypt_expr(db: DatabaseType, value: &str, key_expr: &str) -> String {
    match db {
        DatabaseType::Postgres => format!("pgp_sym_encrypt({value}, {key_expr})"),
        DatabaseType::Mssql => format!("ENCRYPTBYPASSPHRASE({key_expr}, {value})"),
        DatabaseType::MariaDb => format!("AES_ENCRYPT({value}, {key_expr})"),
        DatabaseType::Oracle => format!(
            "DBMS_CRYPTO.ENCRYPT(UTL_RAW.CAST_TO_RAW({value}), {ORACLE_AES256_CBC_PKCS5}, UTL_RAW.CAST_TO_RAW({key_expr}))"
        ),
    }
}

#[must_use]
pub fn decrypt_expr(db: DatabaseType, column: &str, key_expr: &str) -> String {
    match db {
        DatabaseType::Postgres => format!("pgp_sym_decrypt({column}, {key_expr})"),
        DatabaseType::Mssql => {
            format!("CONVERT(VARCHAR(MAX), DECRYPTBYPASSPHRASE({key_expr}, {column}))")
        }
        DatabaseType::MariaDb => format!("AES_DECRYPT({column}, {key_expr})"),
        DatabaseType::Oracle => format!(
            "UTL_RAW.CAST_TO_VARCHAR2(DBMS_CRYPTO.DECRYPT({column}, {ORACLE_AES256_CBC_PKCS5}, UTL_RAW.CAST_TO_RAW({key_expr})))"
        ),
    }
}

/// Searchable hash of `value`, prefixed with the salt when one is given.
#[must_use]
pub fn hash_expr(db: DatabaseType, value: &str, salt_expr: Option<&str>) -> String {
    let salted = match (salt_expr, db) {
        (None, _) => value.to_string(),
        (Some(salt), DatabaseType::Oracle) => format!("{salt} || {value}"),
        (Some(salt), _) => format!("CONCAT({salt}, {value})"),
    };
    match db {
        DatabaseType::Postgres => format!("digest({salted}, 'sha256')"),
        DatabaseType::Mssql => format!("HASHBYTES('SHA2_256', {salted})"),
        DatabaseType::MariaDb => format!("SHA2({salted}, 256)"),
        DatabaseType::Oracle => {
            format!("DBMS_CRYPTO.HASH(UTL_RAW.CAST_TO_RAW({salted}), {ORACLE_HASH_SH256})")
        }
    }
}

/// Expression producing a time-ordered unique id: hex microseconds since the epoch followed
/// by a random UUID. Used as the default of auto-generated id columns.
#[must_use]
pub fn uid_default_expr(db: DatabaseType) -> &'static str {
    match db {
        DatabaseType::Postgres => {
            "CONCAT(to_hex((extract(epoch from now()) * 1000000)::bigint), gen_random_uuid()::text)"
        }
        DatabaseType::Mssql => {
            "CONCAT(CONVERT(VARCHAR(50), CAST(DATEDIFF_BIG(MICROSECOND, '1970-01-01', SYSUTCDATETIME()) AS VARBINARY(8)), 2), LOWER(REPLACE(CONVERT(VARCHAR(36), NEWID()), '-', '')))"
        }
        DatabaseType::Oracle => {
            "LOWER(TO_CHAR(ROUND((CAST(SYS_EXTRACT_UTC(SYSTIMESTAMP) AS DATE) - TO_DATE('1970-01-01','YYYY-MM-DD')) * 86400000000), 'XXXXXXXXXXXXXXXX')) || LOWER(RAWTOHEX(SYS_GUID()))"
        }
        DatabaseType::MariaDb => {
            "CONCAT(HEX(FLOOR(UNIX_TIMESTAMP(NOW(6)) * 1000000)), REPLACE(UUID(), '-', ''))"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_reads_per_dialect() {
        let key = "app.encryption_key";
        assert_eq!(session_key_expr(DatabaseType::Postgres, key), "current_setting('app.encryption_key')");
        assert_eq!(
            session_key_expr(DatabaseType::Mssql, key),
            "CAST(SESSION_CONTEXT(N'app.encryption_key') AS NVARCHAR(MAX))"
        );
        assert_eq!(session_key_expr(DatabaseType::Oracle, key), "SYS_CONTEXT('APP_CTX', 'encryption_key')");
        assert_eq!(session_key_expr(DatabaseType::MariaDb, key), "@app_encryption_key");
        assert_eq!(oracle_context("secret"), ("APP_CTX".to_string(), "secret".to_string()));
        assert_eq!(
            mariadb_key_function_ddl(&mariadb_key_function(key), key),
            "CREATE FUNCTION IF NOT EXISTS session_key_app_encryption_key() RETURNS VARCHAR(1024) \
             NOT DETERMINISTIC NO SQL RETURN @app_encryption_key;\n"
        );
    }

    #[test]
    fn encrypt_and_decrypt_pair_up() {
        let k = "K";
        assert_eq!(encrypt_expr(DatabaseType::Postgres, ":v", k), "pgp_sym_encrypt(:v, K)");
        assert_eq!(decrypt_expr(DatabaseType::Postgres, "c", k), "pgp_sym_decrypt(c, K)");
        assert_eq!(encrypt_expr(DatabaseType::Mssql, ":v", k), "ENCRYPTBYPASSPHRASE(K, :v)");
        assert_eq!(
            decrypt_expr(DatabaseType::Mssql, "c", k),
            "CONVERT(VARCHAR(MAX), DECRYPTBYPASSPHRASE(K, c))"
        );
        assert_eq!(encrypt_expr(DatabaseType::MariaDb, ":v", k), "AES_ENCRYPT(:v, K)");
        assert_eq!(decrypt_expr(DatabaseType::MariaDb, "c", k), "AES_DECRYPT(c, K)");
        assert_eq!(
            encrypt_expr(DatabaseType::Oracle, ":v", k),
            "DBMS_CRYPTO.ENCRYPT(UTL_RAW.CAST_TO_RAW(:v), 4360, UTL_RAW.CAST_TO_RAW(K))"
        );
        assert_eq!(
            decrypt_expr(DatabaseType::Oracle, "c", k),
            "UTL_RAW.CAST_TO_VARCHAR2(DBMS_CRYPTO.DECRYPT(c, 4360, UTL_RAW.CAST_TO_RAW(K)))"
        );
    }

    #[test]
    fn hashes_with_and_without_salt() {
        assert_eq!(
            hash_expr(DatabaseType::Postgres, ":v", Some("S")),
            "digest(CONCAT(S, :v), 'sha256')"
        );
        assert_eq!(hash_expr(DatabaseType::Mssql, ":v", None), "HASHBYTES('SHA2_256', :v)");
        assert_eq!(hash_expr(DatabaseType::MariaDb, ":v", Some("S")), "SHA2(CONCAT(S, :v), 256)");
        assert_eq!(
            hash_expr(DatabaseType::Oracle, ":v", Some("S")),
            "DBMS_CRYPTO.HASH(UTL_RAW.CAST_TO_RAW(S || :v), 4)"
        );
    }
}
