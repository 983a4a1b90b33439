//! Generic SQL type classification for `pg_type` names.

/// A generic, database-independent classification of a column's wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SQLType {
    SmallInt,
    Integer,
    BigInt,
    Double,
    Numeric,
    Real,
    Char,
    VarChar,
    Binary,
    Bit,
    Date,
    Time,
    Timestamp,
    Other,
}

/// Map a `pg_type.typname` to its generic [`SQLType`].
pub fn from_type_name(name: &str) -> SQLType {
    use SQLType::*;
    match name {
        "int2" => SmallInt,
        "int4" | "oid" => Integer,
        "int8" => BigInt,
        "cash" | "money" => Double,
        "numeric" => Numeric,
        "float4" => Real,
        "float8" => Double,
        "bpchar" | "char" | "char2" | "char4" | "char8" | "char16" => Char,
        "varchar" | "text" | "name" | "filename" => VarChar,
        "bytea" => Binary,
        "bool" => Bit,
        "date" => Date,
        "time" => Time,
        "abstime" | "timestamp" | "timestamptz" => Timestamp,
        _ => Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_types() {
        assert_eq!(from_type_name("int4"), SQLType::Integer);
        assert_eq!(from_type_name("varchar"), SQLType::VarChar);
        assert_eq!(from_type_name("timestamptz"), SQLType::Timestamp);
    }

    #[test]
    fn unknown_type_is_other() {
        assert_eq!(from_type_name("some_enum_type"), SQLType::Other);
    }
}
