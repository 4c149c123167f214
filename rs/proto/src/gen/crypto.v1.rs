/// Message with signed header and body.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedMessage {
    /// Serialized header and body of the signed message.
    #[prost(bytes = "vec", tag = "1")]
    pub header_and_body: ::prost::alloc::vec::Vec<u8>,
    /// Raw signature over the header and body.
    #[prost(bytes = "vec", tag = "2")]
    pub signature: ::prost::alloc::vec::Vec<u8>,
}
