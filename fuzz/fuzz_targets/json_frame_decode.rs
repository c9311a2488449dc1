#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use spark_channel::{JsonFrameCodec, ProtocolCodec};

/// 同一字节流按两种方式喂给解码器。
///
/// - **Why**：分帧解码器跨调用保留半帧状态，切分相关的缺陷只会在特定边界上出现；
/// - **How**：一份解码器一次性接收全部字节，另一份按 Fuzzer 给出的长度序列分块接收；
/// - **What**：两者必须给出相同的消息序列，或在同一处失败。
#[derive(Debug, Arbitrary)]
struct ChunkedInput {
    stream: Vec<u8>,
    cuts: Vec<u8>,
}

fuzz_target!(|input: ChunkedInput| {
    let whole = JsonFrameCodec::new().decode(&input.stream);

    let mut codec = JsonFrameCodec::new();
    let mut chunked = Vec::new();
    let mut chunked_failed = false;
    let mut rest = &input.stream[..];
    let mut cuts = input.cuts.iter().map(|cut| usize::from(*cut).max(1)).cycle();
    while !rest.is_empty() {
        let take = cuts.next().unwrap_or(rest.len()).min(rest.len());
        let (head, tail) = rest.split_at(take);
        match codec.decode(head) {
            Ok(messages) => chunked.extend(messages),
            Err(_) => {
                chunked_failed = true;
                break;
            }
        }
        rest = tail;
    }

    match whole {
        Ok(messages) => {
            assert!(!chunked_failed, "chunked decode failed where whole succeeded");
            assert_eq!(messages, chunked);
        }
        Err(_) => assert!(chunked_failed, "whole decode failed where chunked succeeded"),
    }
});
