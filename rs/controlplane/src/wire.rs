//! RPC wire format.
//!
//! A request is sent as two length-delimited frames on a QUIC stream: a
//! bincode-encoded header carrying the method, URI and header map, followed
//! by the raw body bytes. Responses are the same with a status code in
//! place of the method and URI.

use axum::body::{Body, BoxBody, HttpBody};
use bytes::{Buf, BufMut, Bytes};
use futures::{SinkExt, StreamExt};
use http::{
    request::Parts as RequestParts, response::Parts as ResponseParts, HeaderMap, Method, Request,
    Response, StatusCode, Uri,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

pub(crate) async fn read_request<T: AsyncRead + Unpin>(
    recv_stream: &mut FramedRead<T, LengthDelimitedCodec>,
) -> Result<Request<Body>, std::io::Error> {
    let header = recv_stream
        .next()
        .await
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))??;
    let raw_header: WireRequestHeader = bincode::deserialize(&header).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("request wire header deserialization failed: {}", e),
        )
    })?;
    let body = recv_stream
        .next()
        .await
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))??;

    let mut request = Request::builder()
        .method(raw_header.method)
        .uri(raw_header.uri)
        .body(Body::from(body.freeze()))
        .expect("building from typed values can not fail");
    *request.headers_mut() = raw_header.headers;
    Ok(request)
}

pub(crate) async fn read_response<T: AsyncRead + Unpin>(
    recv_stream: &mut FramedRead<T, LengthDelimitedCodec>,
) -> Result<Response<Bytes>, std::io::Error> {
    let header = recv_stream
        .next()
        .await
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))??;
    let raw_header: WireResponseHeader = bincode::deserialize(&header).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("response wire header deserialization failed: {}", e),
        )
    })?;
    let body = recv_stream
        .next()
        .await
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))??;

    let mut response = Response::builder()
        .status(raw_header.status)
        .body(body.freeze())
        .expect("building from typed values can not fail");
    *response.headers_mut() = raw_header.headers;
    Ok(response)
}

pub(crate) async fn write_request<T: AsyncWrite + Unpin>(
    send_stream: &mut FramedWrite<T, LengthDelimitedCodec>,
    request: Request<Bytes>,
) -> Result<(), std::io::Error> {
    let (parts, body) = request.into_parts();
    let parts = WireRequestHeader::from(parts);

    let header = bincode::serialize(&parts).expect("serialization should not fail");
    send_stream.send(Bytes::from(header)).await?;
    send_stream.send(body).await?;

    Ok(())
}

pub(crate) async fn write_response<T: AsyncWrite + Unpin>(
    send_stream: &mut FramedWrite<T, LengthDelimitedCodec>,
    response: Response<BoxBody>,
) -> Result<(), std::io::Error> {
    let (parts, body) = response.into_parts();
    let (parts, body) = match to_bytes(body).await {
        Ok(b) => (WireResponseHeader::from(parts), b),
        Err(e) => (
            WireResponseHeader {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                headers: HeaderMap::new(),
            },
            Bytes::from(e.to_string().into_bytes()),
        ),
    };

    let header = bincode::serialize(&parts).expect("serialization should not fail");
    send_stream.send(Bytes::from(header)).await?;
    send_stream.send(body).await?;

    Ok(())
}

#[derive(Serialize, Deserialize)]
struct WireRequestHeader {
    #[serde(with = "http_serde::method")]
    method: Method,
    #[serde(with = "http_serde::uri")]
    uri: Uri,
    #[serde(with = "http_serde::header_map")]
    headers: HeaderMap,
}

impl From<RequestParts> for WireRequestHeader {
    fn from(value: RequestParts) -> Self {
        Self {
            method: value.method,
            uri: value.uri,
            headers: value.headers,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireResponseHeader {
    #[serde(with = "http_serde::status_code")]
    status: StatusCode,
    #[serde(with = "http_serde::header_map")]
    headers: HeaderMap,
}

impl From<ResponseParts> for WireResponseHeader {
    fn from(value: ResponseParts) -> Self {
        Self {
            status: value.status,
            headers: value.headers,
        }
    }
}

// Drains a BoxBody into contiguous bytes. The data is fully buffered by the
// time a handler returns, so the first data() call usually yields all of it.
async fn to_bytes<T>(body: T) -> Result<Bytes, T::Error>
where
    T: HttpBody + Unpin,
{
    futures::pin_mut!(body);

    let mut first = if let Some(buf) = body.data().await {
        buf?
    } else {
        return Ok(Bytes::new());
    };

    let second = if let Some(buf) = body.data().await {
        buf?
    } else {
        return Ok(first.copy_to_bytes(first.remaining()));
    };

    let rest = (body.size_hint().lower() as usize).min(1024 * 16);
    let cap = first
        .remaining()
        .saturating_add(second.remaining())
        .saturating_add(rest);
    let mut vec = Vec::with_capacity(cap);
    vec.put(first);
    vec.put(second);

    while let Some(buf) = body.data().await {
        vec.put(buf?);
    }

    Ok(vec.into())
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn request_round_trips_over_a_stream() {
        let (client, server) = duplex(4096);
        let mut write = FramedWrite::new(client, LengthDelimitedCodec::new());
        let mut read = FramedRead::new(server, LengthDelimitedCodec::new());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/proto.control_plane.v1.SegmentCreationService/Beacon")
            .header(http::header::CONTENT_TYPE, "application/protobuf")
            .body(Bytes::from_static(b"beacon body"))
            .unwrap();
        write_request(&mut write, request).await.unwrap();

        let received = read_request(&mut read).await.unwrap();
        assert_eq!(received.method(), Method::POST);
        assert_eq!(
            received.uri().path(),
            "/proto.control_plane.v1.SegmentCreationService/Beacon"
        );
        assert_eq!(
            received.headers()[http::header::CONTENT_TYPE],
            "application/protobuf"
        );
        let body = to_bytes(received.into_body()).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"beacon body"));
    }

    #[tokio::test]
    async fn response_round_trips_over_a_stream() {
        let (client, server) = duplex(4096);
        let mut write = FramedWrite::new(server, LengthDelimitedCodec::new());
        let mut read = FramedRead::new(client, LengthDelimitedCodec::new());

        let response = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(axum::body::boxed(Body::from("no such TRC")))
            .unwrap();
        write_response(&mut write, response).await.unwrap();

        let received = read_response(&mut read).await.unwrap();
        assert_eq!(received.status(), StatusCode::NOT_FOUND);
        assert_eq!(received.body().as_ref(), b"no such TRC");
    }
}
