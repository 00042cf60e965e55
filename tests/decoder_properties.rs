//! Property tests for the concatenated-JSON stream decoder

use chatrelay::stream::{ConcatenatedJsonDecoder, FragmentStream, fragments};
use futures::StreamExt;
use proptest::prelude::*;
use serde_json::json;

fn response_json(texts: &[String]) -> String {
    let parts: Vec<_> = texts.iter().map(|t| json!({ "text": t })).collect();
    json!({"candidates": [{"content": {"role": "model", "parts": parts}}]}).to_string()
}

fn decode(chunks: &[&[u8]]) -> Vec<String> {
    let mut decoder = ConcatenatedJsonDecoder::new();
    chunks
        .iter()
        .flat_map(|chunk| decoder.push(chunk))
        .flat_map(|value| fragments(&value))
        .collect()
}

fn text_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-zA-Z0-9 ,.!?\"\\\\ကခဂ]{0,12}", 1..4)
}

proptest! {
    #[test]
    fn split_at_any_two_boundaries_matches_whole(
        texts in text_strategy(),
        a in any::<prop::sample::Index>(),
        b in any::<prop::sample::Index>(),
    ) {
        let body = response_json(&texts);
        let bytes = body.as_bytes();
        let (mut i, mut j) = (a.index(bytes.len() + 1), b.index(bytes.len() + 1));
        if i > j {
            std::mem::swap(&mut i, &mut j);
        }

        let whole = decode(&[bytes]);
        let split = decode(&[&bytes[..i], &bytes[i..j], &bytes[j..]]);

        prop_assert_eq!(&whole, &texts);
        prop_assert_eq!(split, whole);
    }

    #[test]
    fn concatenated_values_yield_fragments_in_order(
        first in text_strategy(),
        second in text_strategy(),
        separator in prop::sample::select(vec!["", "\n", "\r\n", "  "]),
    ) {
        let body = format!("{}{}{}", response_json(&first), separator, response_json(&second));
        let expected: Vec<String> = first.iter().chain(second.iter()).cloned().collect();

        prop_assert_eq!(decode(&[body.as_bytes()]), expected);
    }

    #[test]
    fn byte_at_a_time_matches_whole(texts in text_strategy()) {
        let body = response_json(&texts);
        let chunks: Vec<&[u8]> = body.as_bytes().chunks(1).collect();

        prop_assert_eq!(decode(&chunks), texts);
    }
}

#[tokio::test]
async fn fragment_stream_over_many_small_chunks() {
    let first = response_json(&["မင်္ဂလာ".to_string()]);
    let second = response_json(&["ပါ".to_string(), "!".to_string()]);
    let body = format!("[{},{}]", first, second);
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> = body
        .as_bytes()
        .chunks(7)
        .map(|chunk| Ok(chunk.to_vec()))
        .collect();

    let collected: Vec<String> = FragmentStream::new(futures::stream::iter(chunks))
        .map(|fragment| fragment.unwrap())
        .collect()
        .await;

    assert_eq!(collected, vec!["မင်္ဂလာ", "ပါ", "!"]);
}
