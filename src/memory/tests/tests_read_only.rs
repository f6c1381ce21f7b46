//! Read-only heap and mapped memory: mutation rejection, views, the
//! sequential reader, and releasing a mapping.

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use memmap2::Mmap;
    use tempfile::TempDir;

    use crate::memory::{AccessMode, Memory, MemoryError, MemoryReader};

    fn mapped_file(dir: &TempDir, bytes: &[u8]) -> Memory {
        let path = dir.path().join("mapped");
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        file.sync_all().unwrap();
        drop(file);
        let file = File::open(&path).unwrap();
        let map = unsafe { Mmap::map(&file).unwrap() };
        Memory::mapped(map)
    }

    /// # Scenario
    /// Every mutating call on read-only memory fails with a capability error.
    ///
    /// # Starting environment
    /// Read-only heap memory over 16 bytes.
    ///
    /// # Actions
    /// 1. Call `set_long`, `set_long_n`, `clear` and `copy`.
    ///
    /// # Expected behavior
    /// All return `MemoryError::ReadOnly`; contents unchanged.
    #[test]
    fn heap_rejects_mutation() {
        let mut memory = Memory::read_only(vec![0xFF; 16]);
        let other = Memory::growable(8);
        assert_eq!(memory.access_mode(), AccessMode::ReadOnly);
        assert!(matches!(memory.set_long(0, 1), Err(MemoryError::ReadOnly)));
        assert!(matches!(memory.set_long_n(0, 1, 2), Err(MemoryError::ReadOnly)));
        assert!(matches!(memory.clear(), Err(MemoryError::ReadOnly)));
        assert!(matches!(memory.copy(0, &other, 0, 8), Err(MemoryError::ReadOnly)));
        assert_eq!(memory.get_long(8), u64::MAX);
    }

    #[test]
    fn heap_views_are_rebased() {
        let bytes: Vec<u8> = (0u8..32).collect();
        let memory = Memory::read_only(bytes);
        let view = memory.view(8, 16).unwrap();
        assert_eq!(view.size(), 16);
        assert_eq!(view.get_long_n(0, 1), 8);
        let nested = view.view(4, 4).unwrap();
        assert_eq!(nested.get_int(0), u32::from_le_bytes([12, 13, 14, 15]));
        assert!(matches!(
            view.view(10, 8),
            Err(MemoryError::ViewOutOfRange { .. })
        ));
    }

    /// # Scenario
    /// A mapped file reads like heap memory and reserves no heap bytes.
    ///
    /// # Starting environment
    /// A 24-byte file holding a header word and two payload words.
    ///
    /// # Actions
    /// 1. Map it, parse the header with `MemoryReader`, carve two views.
    ///
    /// # Expected behavior
    /// Views see the payload words; reservation is zero; mutation fails.
    #[test]
    fn mapped_reader_and_views() {
        let dir = TempDir::new().unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u64.to_le_bytes());
        bytes.extend_from_slice(&11u64.to_le_bytes());
        bytes.extend_from_slice(&22u64.to_le_bytes());
        let mut memory = mapped_file(&dir, &bytes);

        assert_eq!(memory.reserved_bytes(), 0);
        assert_eq!(memory.size(), 24);
        assert!(matches!(memory.set_long(0, 0), Err(MemoryError::ReadOnly)));

        let mut reader = MemoryReader::new(&memory);
        assert_eq!(reader.peek().len(), 24);
        reader.skip(8);
        let first = reader.create_view(8).unwrap();
        let second = reader.create_view(8).unwrap();
        assert_eq!(reader.remaining(), 0);
        assert_eq!(first.get_long(0), 11);
        assert_eq!(second.get_long(0), 22);

        drop(first);
        second.release().unwrap();
        memory.release().unwrap();
    }

    /// # Scenario
    /// The owner of a mapping cannot unmap it while a view is alive.
    ///
    /// # Starting environment
    /// Mapped 8-byte file with one outstanding view.
    ///
    /// # Actions
    /// 1. Release the owner while the view lives.
    ///
    /// # Expected behavior
    /// `MemoryError::Unmap` reports one outstanding handle; the view still reads.
    #[test]
    fn release_with_live_view_fails() {
        let dir = TempDir::new().unwrap();
        let memory = mapped_file(&dir, &7u64.to_le_bytes());
        let view = memory.view(0, 8).unwrap();

        match memory.release() {
            Err(MemoryError::Unmap { outstanding }) => assert_eq!(outstanding, 1),
            other => panic!("expected Unmap error, got {other:?}"),
        }
        assert_eq!(view.get_long(0), 7);
    }
}
