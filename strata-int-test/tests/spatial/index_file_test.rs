use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata::{Envelope, ErrorKind, StrataError};
use strata_int_test::test_util::{cleanup, create_test_context, run_test};
use strata_spatial::{IndexOpenOptions, IndexRecordStore, IndexRecordWriter, IndexSource};

/// Record `i` starts right after record `i - 1`, shapefile style.
fn contiguous_records(count: usize, seed: u64) -> Vec<(u32, u32)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut offset = 50u32;
    (0..count)
        .map(|_| {
            let length = rng.random_range(4..200u32);
            let record = (offset, length);
            offset += length + 4;
            record
        })
        .collect()
}

#[test]
fn test_offsets_in_bytes_are_twice_the_words() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("roads.shx");
            let records = contiguous_records(5000, 11);

            let mut writer = IndexRecordWriter::create(&path)?;
            for &(offset, length) in &records {
                writer.append(offset, length);
            }
            writer.finish(3, Envelope::new(-10.0, -10.0, 10.0, 10.0))?;

            for options in [IndexOpenOptions::memory_mapped(), IndexOpenOptions::buffered(64)] {
                let mut store = IndexRecordStore::open(path.as_path(), options)?;
                assert_eq!(store.record_count(), records.len());
                assert_eq!(store.header().shape_type, 3);

                for i in 0..records.len() {
                    let offset = store.get_offset(i)?;
                    assert_eq!(store.get_offset_in_bytes(i)?, offset as u64 * 2);
                    assert_eq!(store.get_length_in_bytes(i)?, store.get_length(i)? as u64 * 2);
                    assert_eq!((offset, store.get_length(i)?), records[i]);
                }
                store.close();
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_buffered_random_access_matches_mapped() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("parcels.shx");
            let records = contiguous_records(3000, 23);

            let mut writer = IndexRecordWriter::create(&path)?;
            for &(offset, length) in &records {
                writer.append(offset, length);
            }
            writer.finish(5, Envelope::new(0.0, 0.0, 1.0, 1.0))?;

            let mut mapped = IndexRecordStore::open(path.as_path(), IndexOpenOptions::memory_mapped())?;
            let mut buffered = IndexRecordStore::open(path.as_path(), IndexOpenOptions::buffered(100))?;

            // jumping around forces the scrolling window to refill backwards
            let mut rng = StdRng::seed_from_u64(5);
            for _ in 0..2000 {
                let i = rng.random_range(0..records.len());
                assert_eq!(buffered.get_record(i)?, mapped.get_record(i)?);
            }

            let last = buffered.get_record(records.len() - 1)?;
            assert_eq!(last.record_id as usize, records.len());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_index_from_stream() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("stream.shx");
            let mut writer = IndexRecordWriter::create(&path)?;
            writer.append(50, 8);
            writer.append(62, 8);
            writer.finish(1, Envelope::new(0.0, 0.0, 2.0, 2.0))?;

            let file = std::fs::File::open(&path)?;
            let mut store = IndexRecordStore::open(IndexSource::reader(file), IndexOpenOptions::buffered(1))?;
            assert_eq!(store.get_offset_in_bytes(1)?, 124);
            assert_eq!(store.get_length_in_bytes(0)?, 16);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_index_failures_carry_a_kind() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("short.shx");
            std::fs::write(&path, vec![0u8; 40])?;
            let err: StrataError = match IndexRecordStore::open(path.as_path(), IndexOpenOptions::buffered(8)) {
                Ok(_) => panic!("a 40 byte file has no complete header"),
                Err(e) => e.into(),
            };
            assert_eq!(err.kind(), &ErrorKind::IOFailure);

            let path = ctx.file("two.shx");
            let mut writer = IndexRecordWriter::create(&path)?;
            writer.append(50, 1);
            writer.append(53, 1);
            writer.finish(1, Envelope::new(0.0, 0.0, 1.0, 1.0))?;

            let mut store = IndexRecordStore::open(path.as_path(), IndexOpenOptions::memory_mapped())?;
            let err: StrataError = match store.get_offset(2) {
                Ok(_) => panic!("record 2 is past the end"),
                Err(e) => e.into(),
            };
            assert_eq!(err.kind(), &ErrorKind::OutOfRange);

            store.close();
            assert!(store.get_offset(0).is_err());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
