//! Tests for the frame codec and the codec plugin table.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::protocol::*;
    use crate::transport::{
        CodecRegistry, Compressor, FrameCodec, GzipCompressor, JsonSerializer, ProtobufSerializer,
        Serializer,
    };
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    fn sample_request(id: RequestId) -> Request {
        Request::new(
            id,
            "Echo",
            "Say",
            vec![json!("hi"), json!(42), json!({"nested": [1, 2, 3]}), json!(null)],
        )
    }

    fn sample_response(id: RequestId) -> Response {
        Response::success(id, json!({"result": [1.5, "two", true]}))
            .with_codec(SerializerType::JSON, CompressType::NONE)
    }

    const COMBOS: [(SerializerType, CompressType); 6] = [
        (SerializerType::MSGPACK, CompressType::GZIP),
        (SerializerType::MSGPACK, CompressType::NONE),
        (SerializerType::PROTOBUF, CompressType::GZIP),
        (SerializerType::PROTOBUF, CompressType::NONE),
        (SerializerType::JSON, CompressType::GZIP),
        (SerializerType::JSON, CompressType::NONE),
    ];

    #[test]
    fn test_roundtrip_every_codec_combination() {
        let codec = FrameCodec::new();
        for (ser, comp) in COMBOS {
            let request = Message::request(sample_request(1), ser, comp);
            let frame = codec.encode(&request).unwrap();
            let decoded = codec.decode_frame(&frame).unwrap();
            assert_eq!(decoded.payload, request.payload, "{} / {}", ser, comp);
            assert_eq!(decoded.header.serialize_type, ser);
            assert_eq!(decoded.header.compress_type, comp);
            assert_eq!(decoded.header.full_length as usize, frame.len());

            let response = Message::response(sample_response(1), ser, comp);
            let frame = codec.encode(&response).unwrap();
            let decoded = codec.decode_frame(&frame).unwrap();
            assert_eq!(decoded.payload, response.payload, "{} / {}", ser, comp);
        }
    }

    #[test]
    fn test_tag_one_frames_carry_protobuf() {
        let codec = FrameCodec::new();
        let request = sample_request(2);
        let frame = codec
            .encode(&Message::request(request.clone(), SerializerType::PROTOBUF, CompressType::NONE))
            .unwrap();
        assert_eq!(frame[8], 1);
        assert_eq!(
            &frame[HEADER_LEN..],
            ProtobufSerializer.serialize_request(&request).unwrap().as_slice()
        );
        assert!(serde_json::from_slice::<Request>(&frame[HEADER_LEN..]).is_err());
        assert_eq!(codec.decode_frame(&frame).unwrap().payload, Payload::Request(request));
    }

    #[test]
    fn test_ping_pong_have_empty_body() {
        let codec = FrameCodec::new();
        let frame = codec
            .encode(&Message::ping(77, SerializerType::MSGPACK, CompressType::GZIP))
            .unwrap();
        assert_eq!(frame.len(), HEADER_LEN);

        let decoded = codec.decode_frame(&frame).unwrap();
        assert_eq!(decoded.payload, Payload::Ping);
        assert_eq!(decoded.request_id(), 77);

        let frame = codec
            .encode(&Message::pong(78, SerializerType::JSON, CompressType::NONE))
            .unwrap();
        assert_eq!(codec.decode_frame(&frame).unwrap().payload, Payload::Pong);
    }

    #[test]
    fn test_decode_rejects_foreign_magic() {
        let codec = FrameCodec::new();
        let mut frame = codec
            .encode(&Message::request(sample_request(3), SerializerType::JSON, CompressType::NONE))
            .unwrap();
        frame[0] = b'G';

        match codec.decode_frame(&frame) {
            Err(MsrpcError::Protocol(msg)) => assert_eq!(msg, "magic number error"),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tags_are_unsupported() {
        let codec = FrameCodec::new();
        let message = Message::request(sample_request(4), SerializerType(9), CompressType::GZIP);
        assert!(matches!(
            codec.encode(&message),
            Err(MsrpcError::UnsupportedCodec { kind: "serializer", tag: 9 })
        ));

        let mut frame = codec
            .encode(&Message::request(sample_request(4), SerializerType::JSON, CompressType::GZIP))
            .unwrap();
        frame[7] = 42;
        assert!(matches!(
            codec.decode_frame(&frame),
            Err(MsrpcError::UnsupportedCodec { kind: "compressor", tag: 42 })
        ));
    }

    #[test]
    fn test_truncated_body_is_an_error() {
        let codec = FrameCodec::new();
        let frame = codec
            .encode(&Message::request(sample_request(5), SerializerType::JSON, CompressType::NONE))
            .unwrap();
        let truncated = &frame[..frame.len() - 3];
        assert!(matches!(codec.decode_frame(truncated), Err(MsrpcError::Connection(_))));
    }

    #[test]
    fn test_corrupt_body_is_a_codec_error() {
        let codec = FrameCodec::new();
        let mut frame = codec
            .encode(&Message::request(sample_request(6), SerializerType::JSON, CompressType::NONE))
            .unwrap();
        let last = frame.len() - 1;
        frame[HEADER_LEN] = b'#';
        frame[last] = b'#';
        assert!(matches!(codec.decode_frame(&frame), Err(MsrpcError::Codec(_))));
    }

    #[test]
    fn test_decode_consumes_exactly_one_frame() {
        let codec = FrameCodec::new();
        let mut stream = codec
            .encode(&Message::request(sample_request(10), SerializerType::MSGPACK, CompressType::GZIP))
            .unwrap();
        stream.extend(
            codec
                .encode(&Message::ping(11, SerializerType::MSGPACK, CompressType::GZIP))
                .unwrap(),
        );

        let mut reader = stream.as_slice();
        let first = codec.decode_blocking(&mut reader).unwrap();
        assert_eq!(first.request_id(), 10);
        let second = codec.decode_blocking(&mut reader).unwrap();
        assert_eq!(second.payload, Payload::Ping);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_gzip_shrinks_repetitive_payloads() {
        let gzip = GzipCompressor::default();
        let data = vec![b'a'; 64 * 1024];
        let compressed = gzip.compress(&data).unwrap();
        assert!(compressed.len() < data.len() / 10);
        assert_eq!(gzip.decompress(&compressed).unwrap(), data);
        assert!(gzip.decompress(b"not gzip").is_err());
    }

    struct ReversingCompressor;

    impl Compressor for ReversingCompressor {
        fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
            Ok(data.iter().rev().copied().collect())
        }

        fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
            self.compress(data)
        }
    }

    #[test]
    fn test_registered_plugins_need_no_framing_changes() {
        let mut registry = CodecRegistry::empty();
        registry
            .register_serializer(SerializerType(5), JsonSerializer)
            .register_compressor(CompressType(6), ReversingCompressor);
        let codec = FrameCodec::with_registry(Arc::new(registry));
        assert!(codec.registry().supports(SerializerType(5), CompressType(6)));
        assert!(!codec.registry().supports(SerializerType::MSGPACK, CompressType(6)));

        let message = Message::request(sample_request(12), SerializerType(5), CompressType(6));
        let frame = codec.encode(&message).unwrap();
        assert_eq!(frame[HEADER_LEN], b'}');
        assert_eq!(codec.decode_frame(&frame).unwrap().payload, message.payload);
    }

    #[test]
    fn test_serializers_reject_each_others_bytes() {
        let json = JsonSerializer.serialize_request(&sample_request(13)).unwrap();
        assert!(crate::transport::MsgPackSerializer.deserialize_request(&json).is_err());
    }

    #[tokio::test]
    async fn test_read_frame_waits_for_short_reads() {
        let codec = FrameCodec::new();
        let frame = codec
            .encode(&Message::request(sample_request(20), SerializerType::MSGPACK, CompressType::GZIP))
            .unwrap();

        let (mut writer, mut reader) = tokio::io::duplex(8);
        let chunks = frame.clone();
        let feeder = tokio::spawn(async move {
            for chunk in chunks.chunks(5) {
                writer.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let decoded = codec.read_frame(&mut reader).await.unwrap();
        feeder.await.unwrap();
        assert_eq!(decoded.request_id(), 20);
        assert_eq!(decoded.payload, Payload::Request(sample_request(20)));
    }

    #[tokio::test]
    async fn test_write_frame_then_read_frame() {
        let codec = FrameCodec::new();
        let (mut client, mut server) = tokio::io::duplex(1024);
        let message = Message::response(sample_response(30), SerializerType::JSON, CompressType::GZIP);

        codec.write_frame(&mut client, &message).await.unwrap();
        let decoded = codec.read_frame(&mut server).await.unwrap();
        assert_eq!(decoded.payload, message.payload);
    }

    #[tokio::test]
    async fn test_oversized_claim_with_short_body() {
        let codec = FrameCodec::new();
        let mut header = Header::new(MessageType::Request, SerializerType::MSGPACK, CompressType::NONE, 40);
        header.full_length = MAX_FRAME_SIZE as u32;

        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&header.to_bytes()).await.unwrap();
        client.write_all(&[0u8; 10]).await.unwrap();
        drop(client);

        match codec.read_raw(&mut server).await {
            Err(MsrpcError::Connection(msg)) => {
                assert!(msg.contains(&format!("got 10 of {}", MAX_FRAME_SIZE - HEADER_LEN)), "{}", msg)
            }
            other => panic!("expected connection error, got {:?}", other),
        }

        let mut frame = header.to_bytes().to_vec();
        frame.extend_from_slice(&[0u8; 10]);
        assert!(matches!(codec.decode_frame(&frame), Err(MsrpcError::Connection(_))));
    }

    #[tokio::test]
    async fn test_read_frame_reports_closed_peer() {
        let codec = FrameCodec::new();
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(matches!(
            codec.read_frame(&mut server).await,
            Err(MsrpcError::Connection(_))
        ));
    }
}
