#[allow(clippy::all)]
#[path = "../gen/control_plane.v1.rs"]
pub mod v1;

/// HTTP path of the `SegmentCreationService.Beacon` procedure.
pub const SEGMENT_CREATION_BEACON_PROCEDURE: &str =
    "/proto.control_plane.v1.SegmentCreationService/Beacon";
/// HTTP path of the `SegmentLookupService.Segments` procedure.
pub const SEGMENT_LOOKUP_SEGMENTS_PROCEDURE: &str =
    "/proto.control_plane.v1.SegmentLookupService/Segments";
/// HTTP path of the `SegmentRegistrationService.SegmentsRegistration` procedure.
pub const SEGMENT_REGISTRATION_PROCEDURE: &str =
    "/proto.control_plane.v1.SegmentRegistrationService/SegmentsRegistration";
/// HTTP path of the `TrustMaterialService.Chains` procedure.
pub const TRUST_MATERIAL_CHAINS_PROCEDURE: &str =
    "/proto.control_plane.v1.TrustMaterialService/Chains";
/// HTTP path of the `TrustMaterialService.TRC` procedure.
pub const TRUST_MATERIAL_TRC_PROCEDURE: &str =
    "/proto.control_plane.v1.TrustMaterialService/TRC";
