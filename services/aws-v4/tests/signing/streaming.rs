// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use super::*;
use bytes::Bytes;
use pretty_assertions::assert_eq;
use std::io::Cursor;
use streamsign_aws_v4::aws_chunked_content_length;
use streamsign_core::{BufferedStream, ErrorKind, SeekableStream, ZeroStream};
use test_case::test_case;

fn chunked_signer() -> RequestSigner {
    RequestSigner::new("s3", "us-east-1")
        .with_chunk_size(10)
        .with_time(test_time())
}

fn sign_zeros(len: u64) -> Result<(Parts, SignedBody)> {
    let mut parts = put_parts("http://127.0.0.1:9000/bucket/object")?;
    let body = sign(
        &chunked_signer(),
        &mut parts,
        SigningBody::from_stream(ZeroStream::new(len)),
    )?;
    Ok((parts, body))
}

#[test_case(1; "one byte")]
#[test_case(7; "odd size")]
#[test_case(96; "larger than a frame")]
#[test_case(4096; "page")]
fn test_output_independent_of_read_size(buf_size: usize) {
    let (_, body) = sign_zeros(35).expect("sign must succeed");
    let expected = read_all(body).expect("read must succeed");

    let (_, body) = sign_zeros(35).expect("sign must succeed");
    let mut reader = body.into_reader();
    let mut actual = Vec::new();
    let mut buf = vec![0; buf_size];
    loop {
        let n = reader.read(&mut buf).expect("read must succeed");
        if n == 0 {
            break;
        }
        actual.extend_from_slice(&buf[..n]);
    }

    assert_eq!(actual, expected);
}

#[test_case(0, vec![0]; "empty body")]
#[test_case(30, vec![10, 10, 10, 0]; "multiple of chunk size")]
#[test_case(35, vec![10, 10, 10, 5, 0]; "with remainder")]
#[test_case(9, vec![9, 0]; "smaller than chunk size")]
fn test_chunk_layout(len: u64, sizes: Vec<usize>) {
    let (parts, body) = sign_zeros(len).expect("sign must succeed");
    let framed = read_all(body).expect("read must succeed");

    assert_eq!(framed.len() as u64, aws_chunked_content_length(len, 10));
    assert_eq!(
        header(&parts, "content-length"),
        aws_chunked_content_length(len, 10).to_string()
    );
    assert_eq!(header(&parts, "x-amz-decoded-content-length"), len.to_string());

    let frames = parse_frames(&framed);
    let actual: Vec<_> = frames.iter().map(|f| f.payload.len()).collect();
    assert_eq!(actual, sizes);
}

#[test]
fn test_signing_is_deterministic() -> Result<()> {
    let (first_parts, first) = sign_zeros(35)?;
    let (second_parts, second) = sign_zeros(35)?;

    assert_eq!(
        header(&first_parts, "authorization"),
        header(&second_parts, "authorization")
    );
    assert_eq!(read_all(first)?, read_all(second)?);
    Ok(())
}

#[test]
fn test_chunk_signatures_are_chained() -> Result<()> {
    let mut content = vec![0; 35];
    let (_, body) = sign_zeros(35)?;
    let expected = parse_frames(&read_all(body)?);

    // Change one byte in the second chunk.
    content[15] = 1;
    let mut parts = put_parts("http://127.0.0.1:9000/bucket/object")?;
    let body = sign(&chunked_signer(), &mut parts, content)?;
    let actual = parse_frames(&read_all(body)?);

    assert_eq!(actual.len(), expected.len());
    assert_eq!(actual[0], expected[0]);
    for (a, e) in actual.iter().zip(expected.iter()).skip(1) {
        assert_ne!(a.signature, e.signature);
    }
    Ok(())
}

#[test]
fn test_header_signature_ignores_streamed_content() -> Result<()> {
    let (zero_parts, _) = sign_zeros(35)?;

    let mut parts = put_parts("http://127.0.0.1:9000/bucket/object")?;
    sign(&chunked_signer(), &mut parts, vec![b'x'; 35])?;

    assert_eq!(
        header(&parts, "authorization"),
        header(&zero_parts, "authorization")
    );
    Ok(())
}

#[test]
fn test_inner_read_size_does_not_matter() -> Result<()> {
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(3);
            self.0.read(&mut buf[..n])
        }
    }

    let (_, body) = sign_zeros(35)?;
    let expected = read_all(body)?;

    let mut parts = put_parts("http://127.0.0.1:9000/bucket/object")?;
    let stream = BufferedStream::new(Trickle(Cursor::new(vec![0; 35])));
    let body = sign(&chunked_signer(), &mut parts, SigningBody::from_stream(stream))?;

    assert_eq!(read_all(body)?, expected);
    Ok(())
}

#[test]
fn test_short_body_is_protocol_violation() -> Result<()> {
    let mut parts = put_parts("http://127.0.0.1:9000/bucket/object")?;
    parts
        .headers
        .insert(http::header::CONTENT_LENGTH, "35".parse()?);

    let stream = SeekableStream::from_bytes(Bytes::from(vec![0; 20]));
    let body = sign(&chunked_signer(), &mut parts, SigningBody::from_stream(stream))?;

    let mut framed = Vec::new();
    let err = body
        .into_reader()
        .read_to_end(&mut framed)
        .expect_err("short body must fail");
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    let err = streamsign_core::Error::from(err);
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);

    // The two full chunks made it out, the partial one never did.
    let text = String::from_utf8_lossy(&framed);
    assert_eq!(text.matches(";chunk-signature=").count(), 2);
    Ok(())
}

#[test]
fn test_long_body_is_protocol_violation() -> Result<()> {
    let mut parts = put_parts("http://127.0.0.1:9000/bucket/object")?;
    parts
        .headers
        .insert(http::header::CONTENT_LENGTH, "20".parse()?);

    let stream = SeekableStream::from_bytes(Bytes::from(vec![0; 35]));
    let body = sign(&chunked_signer(), &mut parts, SigningBody::from_stream(stream))?;

    let err = read_all(body).expect_err("long body must fail");
    let err = err
        .downcast::<std::io::Error>()
        .expect("error must come from reading");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    let err = streamsign_core::Error::from(err);
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    Ok(())
}

#[test]
fn test_get_is_never_framed() -> Result<()> {
    let (mut parts, _) = http::Request::get("http://127.0.0.1:9000/bucket/object")
        .body(())?
        .into_parts();
    let body = sign(&chunked_signer(), &mut parts, SigningBody::empty())?;

    assert!(!body.is_framed());
    assert_eq!(
        header(&parts, "x-amz-content-sha256"),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert!(parts.headers.get("x-amz-decoded-content-length").is_none());
    Ok(())
}

#[test]
fn test_caller_content_hash_disables_chunking() -> Result<()> {
    let mut parts = put_parts("http://127.0.0.1:9000/bucket/object")?;
    parts
        .headers
        .insert("x-amz-content-sha256", "UNSIGNED-PAYLOAD".parse()?);
    let body = sign(&chunked_signer(), &mut parts, vec![0; 35])?;

    assert!(!body.is_framed());
    assert_eq!(header(&parts, "x-amz-content-sha256"), "UNSIGNED-PAYLOAD");
    assert_eq!(read_all(body)?, vec![0; 35]);
    Ok(())
}

#[test]
fn test_content_encoding_is_prepended() -> Result<()> {
    let mut parts = put_parts("http://127.0.0.1:9000/bucket/object")?;
    parts
        .headers
        .insert(http::header::CONTENT_ENCODING, "gzip".parse()?);
    sign(&chunked_signer(), &mut parts, vec![0; 35])?;

    assert_eq!(header(&parts, "content-encoding"), "aws-chunked,gzip");
    Ok(())
}

#[test]
fn test_explicit_host_is_signed() -> Result<()> {
    let mut parts = put_parts("http://127.0.0.1:9000/bucket/object")?;
    parts
        .headers
        .insert(http::header::HOST, "custom.example".parse()?);
    sign(&chunked_signer(), &mut parts, vec![0; 35])?;

    assert_eq!(header(&parts, "host"), "custom.example");
    let authorization = header(&parts, "authorization");
    let signed_headers = authorization
        .split("SignedHeaders=")
        .nth(1)
        .and_then(|v| v.split(',').next())
        .expect("authorization must carry signed headers");
    assert!(signed_headers.split(';').any(|h| h == "host"));

    // Signed exactly as if it were sent to that host.
    let mut direct = put_parts("http://custom.example/bucket/object")?;
    sign(&chunked_signer(), &mut direct, vec![0; 35])?;
    assert_eq!(authorization, header(&direct, "authorization"));
    Ok(())
}
