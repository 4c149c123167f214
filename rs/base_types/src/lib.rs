//! Base Types
//!
//! Shared identifier and time types used across the CION node: the
//! ISD / AS / ISD-AS addressing scheme and the second-granular validity
//! window carried by TRCs and certificates.
//!
//! Addresses follow the canonical SCION textual forms: ISDs are decimal
//! 16-bit numbers, AS numbers print as plain decimal when they fit into
//! the BGP range and as three colon-separated 16-bit hex groups
//! otherwise, and the combined form is `<isd>-<as>` (e.g. `1-ff00:0:110`).

mod addr;
mod validity;

pub use addr::{Asn, AddrParseError, Ia, Isd};
pub use validity::Validity;
