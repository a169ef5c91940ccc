use bytes::Bytes;

/// Split a buffer into consecutive pieces of at most `max` bytes without copying
pub fn split_chunks(mut bytes: Bytes, max: usize) -> impl Iterator<Item = Bytes> {
    let max = max.max(1);
    std::iter::from_fn(move || {
        if bytes.is_empty() {
            None
        } else {
            let at = bytes.len().min(max);
            Some(bytes.split_to(at))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_chunks_exact_multiple() {
        let chunks: Vec<Bytes> = split_chunks(Bytes::from_static(b"aabbcc"), 2).collect();
        assert_eq!(chunks, vec!["aa", "bb", "cc"]);
    }

    #[test]
    fn test_split_chunks_remainder() {
        let chunks: Vec<Bytes> = split_chunks(Bytes::from_static(b"hello"), 2).collect();
        assert_eq!(chunks, vec!["he", "ll", "o"]);
    }

    #[test]
    fn test_split_chunks_small_and_empty() {
        let chunks: Vec<Bytes> = split_chunks(Bytes::from_static(b"hi"), 1024).collect();
        assert_eq!(chunks, vec!["hi"]);

        assert_eq!(split_chunks(Bytes::new(), 16).count(), 0);
    }

    #[test]
    fn test_split_chunks_concatenation_is_identity() {
        let original: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let joined: Vec<u8> = split_chunks(Bytes::from(original.clone()), 333)
            .flat_map(|chunk| chunk.to_vec())
            .collect();
        assert_eq!(joined, original);
    }
}
