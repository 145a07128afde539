use crc32fast::Hasher;

/// Stable per-client seed derived from the document and client ids using CRC32
pub fn client_seed(document_id: &str, client_id: u64) -> String {
    let mut hasher = Hasher::new();
    hasher.update(format!("redline://{document_id}/{client_id}").as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sequential suggestion id generator
///
/// Ids from different clients differ in their seed, so peers never collide
/// without coordination.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    seed: String,
    count: u32,
}

impl IdGenerator {
    pub fn new(document_id: &str, client_id: u64) -> Self {
        Self {
            seed: client_seed(document_id, client_id),
            count: 0,
        }
    }

    pub fn from_seed(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            count: 0,
        }
    }

    pub fn next_id(&mut self) -> String {
        self.count += 1;
        format!("{}-{}", self.seed, self.count)
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_stable_per_client() {
        assert_eq!(client_seed("doc", 1), client_seed("doc", 1));
        assert_ne!(client_seed("doc", 1), client_seed("doc", 2));
        assert_ne!(client_seed("doc", 1), client_seed("other", 1));
    }

    #[test]
    fn test_sequential_ids() {
        let mut ids = IdGenerator::from_seed("abc");
        assert_eq!(ids.next_id(), "abc-1");
        assert_eq!(ids.next_id(), "abc-2");
        assert_eq!(ids.seed(), "abc");
    }

    #[test]
    fn test_ids_contain_no_annotation_separator() {
        let mut ids = IdGenerator::new("doc:with:colons", 9);
        assert!(!ids.next_id().contains(':'));
    }
}
