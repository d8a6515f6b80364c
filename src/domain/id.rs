//! Domain ID Types with NewType Pattern
//!
//! Type-safe wrappers for the integer identifiers the store assigns, so a pool
//! ID can never be passed where a cluster ID is expected.

use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{Decode, Encode, Postgres, Type};
use std::fmt;
use std::str::FromStr;

/// Macro to generate NewType ID wrappers with all required traits
macro_rules! domain_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw store identifier
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the inner value
            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        // SQLx trait implementations for database compatibility
        impl Type<Postgres> for $name {
            fn type_info() -> PgTypeInfo {
                <i64 as Type<Postgres>>::type_info()
            }
        }

        impl<'q> Encode<'q, Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
                <i64 as Encode<'q, Postgres>>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> Decode<'r, Postgres> for $name {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let id = <i64 as Decode<'r, Postgres>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

domain_id!(
    /// Product (tenant) identifier
    ProductId
);

domain_id!(
    /// Backend instance pool identifier
    PoolId
);

domain_id!(
    /// Load balancer fleet deployment unit identifier
    BfeClusterId
);

domain_id!(
    /// Sub-cluster identifier
    SubClusterId
);

domain_id!(
    /// Service cluster identifier
    ClusterId
);

domain_id!(
    /// Hostname identifier
    DomainId
);

domain_id!(
    /// TLS certificate identifier
    CertificateId
);
