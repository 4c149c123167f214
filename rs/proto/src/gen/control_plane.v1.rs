/// Single AS entry of a path segment.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AsEntry {
    /// The signed component of the AS entry.
    #[prost(message, optional, tag = "1")]
    pub signed: ::core::option::Option<super::super::crypto::v1::SignedMessage>,
}
/// Meta information about a path segment.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SegmentInformation {
    /// Segment creation time in seconds since the UNIX epoch.
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    /// Random identifier of the segment.
    #[prost(uint32, tag = "2")]
    pub segment_id: u32,
}
/// Path segment consisting of the segment information and an entry per
/// traversed AS.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PathSegment {
    /// Serialized `SegmentInformation`.
    #[prost(bytes = "vec", tag = "1")]
    pub segment_info: ::prost::alloc::vec::Vec<u8>,
    /// AS entries, one per AS on the segment.
    #[prost(message, repeated, tag = "2")]
    pub as_entries: ::prost::alloc::vec::Vec<AsEntry>,
}
/// Beacon advertising a (partial) path segment.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BeaconRequest {
    /// The partial path segment to extend.
    #[prost(message, optional, tag = "1")]
    pub segment: ::core::option::Option<PathSegment>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BeaconResponse {}
/// Segment lookup request for paths between two ASes.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SegmentsRequest {
    /// Packed source ISD-AS.
    #[prost(uint64, tag = "1")]
    pub src_isd_as: u64,
    /// Packed destination ISD-AS.
    #[prost(uint64, tag = "2")]
    pub dst_isd_as: u64,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SegmentsResponse {
    /// Mapping from `SegmentType` to the matching segments.
    #[prost(map = "int32, message", tag = "1")]
    pub segments: ::std::collections::HashMap<i32, segments_response::Segments>,
}
/// Nested message and enum types in `SegmentsResponse`.
pub mod segments_response {
    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Segments {
        #[prost(message, repeated, tag = "1")]
        pub segments: ::prost::alloc::vec::Vec<super::PathSegment>,
    }
}
/// Segment registration request.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SegmentsRegistrationRequest {
    /// Mapping from `SegmentType` to the segments to register.
    #[prost(map = "int32, message", tag = "1")]
    pub segments: ::std::collections::HashMap<i32, segments_registration_request::Segments>,
}
/// Nested message and enum types in `SegmentsRegistrationRequest`.
pub mod segments_registration_request {
    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Segments {
        #[prost(message, repeated, tag = "1")]
        pub segments: ::prost::alloc::vec::Vec<super::PathSegment>,
    }
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SegmentsRegistrationResponse {}
/// TRC lookup request.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TrcRequest {
    /// ISD of the TRC.
    #[prost(uint32, tag = "1")]
    pub isd: u32,
    /// Base version, 0 selects the latest.
    #[prost(uint64, tag = "2")]
    pub base: u64,
    /// Serial version, 0 selects the latest.
    #[prost(uint64, tag = "3")]
    pub serial: u64,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TrcResponse {
    /// DER-encoded TRC.
    #[prost(bytes = "vec", tag = "1")]
    pub trc: ::prost::alloc::vec::Vec<u8>,
}
/// Certificate chain lookup request.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChainsRequest {
    /// Packed ISD-AS of the chain subject.
    #[prost(uint64, tag = "1")]
    pub isd_as: u64,
    /// Optional subject key identifier prefix the chains must match.
    #[prost(bytes = "vec", tag = "2")]
    pub subject_key_id: ::prost::alloc::vec::Vec<u8>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChainsResponse {
    #[prost(message, repeated, tag = "1")]
    pub chains: ::prost::alloc::vec::Vec<Chain>,
}
/// Certificate chain of an AS certificate and its issuing CA certificate.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Chain {
    /// DER-encoded AS certificate.
    #[prost(bytes = "vec", tag = "1")]
    pub as_cert: ::prost::alloc::vec::Vec<u8>,
    /// DER-encoded CA certificate.
    #[prost(bytes = "vec", tag = "2")]
    pub ca_cert: ::prost::alloc::vec::Vec<u8>,
}
/// Type of a path segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SegmentType {
    Unspecified = 0,
    Up = 1,
    Down = 2,
    Core = 3,
}
impl SegmentType {
    /// String value of the enum field names used in the ProtoBuf definition.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            SegmentType::Unspecified => "SEGMENT_TYPE_UNSPECIFIED",
            SegmentType::Up => "SEGMENT_TYPE_UP",
            SegmentType::Down => "SEGMENT_TYPE_DOWN",
            SegmentType::Core => "SEGMENT_TYPE_CORE",
        }
    }
}
