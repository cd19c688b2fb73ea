use crc32fast::Hasher;

/// Generate a stable document id from a book identifier using CRC32
pub fn get_document_id(book_id: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(book_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sequential id generator for sequences and nodes within a document
#[derive(Debug, Clone)]
pub struct IdGenerator {
    seed: String, // Document id (CRC32)
    count: u32,   // Sequential counter
}

impl IdGenerator {
    pub fn new(book_id: &str) -> Self {
        Self {
            seed: get_document_id(book_id),
            count: 0,
        }
    }

    pub fn from_seed(seed: String) -> Self {
        Self { seed, count: 0 }
    }

    /// Generate next sequential id
    pub fn new_id(&mut self) -> String {
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
    fn test_document_id_is_stable() {
        let id1 = get_document_id("TIT");
        let id2 = get_document_id("TIT");
        assert_eq!(id1, id2);

        let id3 = get_document_id("GEN");
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_sequential_ids() {
        let mut gen = IdGenerator::new("TIT");

        let id1 = gen.new_id();
        let id2 = gen.new_id();

        assert!(id1.ends_with("-1"));
        assert!(id2.ends_with("-2"));
        assert!(id1.starts_with(gen.seed()));
    }
}
