// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use rkyv::de::deserializers::SharedDeserializeMap;
use rkyv::ser::serializers::AllocSerializer;
use rkyv::ser::Serializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{AlignedVec, Archive, CheckBytes, Deserialize, Serialize};
use spore_core::TransportError;

pub struct RkyvCodec;

impl RkyvCodec {
    pub fn encode<T>(item: &T) -> Result<Vec<u8>, TransportError>
    where
        T: Serialize<AllocSerializer<1024>>,
    {
        let mut serializer = AllocSerializer::<1024>::default();
        serializer
            .serialize_value(item)
            .map_err(|e| TransportError::Codec(format!("serialization failed: {:?}", e)))?;
        Ok(serializer.into_serializer().into_inner().into_vec())
    }

    /// Validates the archive before deserializing it. Socket buffers carry no
    /// alignment guarantee, so the bytes are copied into an aligned buffer
    /// first.
    pub fn decode<T>(bytes: &[u8]) -> Result<T, TransportError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, SharedDeserializeMap>,
    {
        let mut aligned = AlignedVec::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);

        let archived = rkyv::check_archived_root::<T>(aligned.as_slice()).map_err(|_| {
            TransportError::Codec(format!("invalid archive (len: {})", bytes.len()))
        })?;

        let mut deserializer = SharedDeserializeMap::new();
        archived
            .deserialize(&mut deserializer)
            .map_err(|_| TransportError::Codec("deserialization failed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spore_model::{
        AgentIdentity, Endpoint, Instance, Permission, PermissionIdentity, StationRequest,
        StationResponse, Status, TransferRequest,
    };

    fn instance() -> Instance {
        Instance::new(
            42,
            AgentIdentity::new("disk-report", "h1"),
            Endpoint::new("127.0.0.1", 1099),
            "default",
            "disk-report.pkg",
            vec!["127.0.0.1".into(), "1100".into()],
        )
    }

    #[test]
    fn transfer_request_keeps_payloads_intact() {
        let req = StationRequest::Transfer(TransferRequest {
            instance: instance(),
            agent_bytes: vec![1, 2, 3],
            package_name: "disk-report.pkg".into(),
            place_name: "default".into(),
            package_data: vec![0xAB; 4096],
        });

        let bytes = RkyvCodec::encode(&req).unwrap();
        match RkyvCodec::decode::<StationRequest>(&bytes).unwrap() {
            StationRequest::Transfer(t) => {
                assert_eq!(t.instance, instance());
                assert_eq!(t.agent_bytes, vec![1, 2, 3]);
                assert_eq!(t.package_data.len(), 4096);
                assert_eq!(t.instance.status, Status::AtHome);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn absent_permission_is_distinct_from_deny() {
        let absent = RkyvCodec::encode(&StationResponse::Permission(None)).unwrap();
        let denied = RkyvCodec::encode(&StationResponse::Permission(Some(Permission::deny()))).unwrap();

        assert!(matches!(
            RkyvCodec::decode::<StationResponse>(&absent).unwrap(),
            StationResponse::Permission(None)
        ));
        assert!(matches!(
            RkyvCodec::decode::<StationResponse>(&denied).unwrap(),
            StationResponse::Permission(Some(Permission { allowed: false, .. }))
        ));
    }

    #[test]
    fn garbage_is_rejected_not_trusted() {
        let err = RkyvCodec::decode::<StationRequest>(&[0xFF; 7]).unwrap_err();
        assert!(matches!(err, TransportError::Codec(_)));

        let query = StationRequest::LookupPermission(PermissionIdentity::new("a", "h1", "p"));
        let mut bytes = RkyvCodec::encode(&query).unwrap();
        bytes.truncate(bytes.len() / 2);
        assert!(RkyvCodec::decode::<StationRequest>(&bytes).is_err());
    }
}
