//! Strongly typed identifiers for the network control plane.
//!
//! Every entity id in this workspace is a newtype around `uuid::Uuid`
//! rather than a bare `Uuid`, so the compiler catches an `InstanceId`
//! passed where a `NetworkId` was expected.

#[derive(Debug, thiserror::Error)]
pub enum UuidConversionError {
    #[error("invalid UUID for field of type {ty}: {value}")]
    InvalidUuid { ty: &'static str, value: String },
}

/// Defines a typed UUID wrapper with the usual conversions: `Display`,
/// `FromStr`, `From<Uuid>`, and (behind the `sqlx` feature) the traits
/// needed to bind it directly to a query or decode it from a row.
#[macro_export]
macro_rules! typed_uuid {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash, Default,
            PartialOrd, Ord,
        )]
        #[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
        #[cfg_attr(feature = "sqlx", sqlx(transparent))]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> uuid::Uuid {
                self.0
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::UuidConversionError;
            fn from_str(input: &str) -> Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(input).map_err(|_| {
                    $crate::UuidConversionError::InvalidUuid {
                        ty: stringify!($name),
                        value: input.to_string(),
                    }
                })?))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        #[cfg(feature = "sqlx")]
        impl sqlx::postgres::PgHasArrayType for $name {
            fn array_type_info() -> sqlx::postgres::PgTypeInfo {
                <uuid::Uuid as sqlx::postgres::PgHasArrayType>::array_type_info()
            }

            fn array_compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <uuid::Uuid as sqlx::postgres::PgHasArrayType>::array_compatible(ty)
            }
        }
    };
}

pub mod network {
    //! Identifiers for [`Network`](net_uuid) and its child rows.
    typed_uuid!(NetworkId);
    typed_uuid!(NetworkPrefixId);
}

pub mod instance {
    typed_uuid!(InstanceId);
}

pub mod vif {
    typed_uuid!(VifId);
}

pub mod floating_ip {
    typed_uuid!(FloatingIpId);
}

pub mod project {
    typed_uuid!(ProjectId);
}

pub mod dns {
    typed_uuid!(DnsDomainId);
}

#[cfg(test)]
mod tests {
    use super::network::NetworkId;
    use std::str::FromStr;

    #[test]
    fn round_trips_through_string() {
        let id = NetworkId::new_v4();
        let parsed = NetworkId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(NetworkId::from_str("not-a-uuid").is_err());
    }

    #[test]
    fn serializes_as_plain_uuid_string() {
        let id = NetworkId::new_v4();
        let json = serde_json::to_string(&id.0).unwrap();
        let as_id = serde_json::to_string(&id).unwrap();
        assert_eq!(json, as_id);
    }
}
