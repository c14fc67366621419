mod common;

mod archive {
    use crate::common;
    use pretty_assertions::assert_eq;
    use ringlog::error::Error;
    use ringlog::{FullPolicy, Ringlog};

    #[test]
    fn flag_roundtrip() {
        let mut flash = common::Flash::new(8);
        let cfg = common::config(FullPolicy::StopWhenFull);
        let mut log = Ringlog::mount(cfg, &mut flash).unwrap();

        log.append(&common::payload(0)).unwrap();
        log.append(&common::payload(1)).unwrap();

        let mut buf = [0u8; common::PAYLOAD_SIZE];
        log.read_first(&mut buf).unwrap();
        assert_eq!(log.is_archived(), Ok(false));
        log.set_archived().unwrap();
        assert_eq!(log.is_archived(), Ok(true));

        log.read_next(&mut buf).unwrap();
        assert_eq!(log.is_archived(), Ok(false));

        // the flag sits on the medium, not in the cursor
        log.read_first(&mut buf).unwrap();
        assert_eq!(buf, common::payload(0));
        assert_eq!(log.is_archived(), Ok(true));
        drop(log);

        assert_eq!(flash.record_marker(0, 0), common::MARKER_ARCHIVED);
        // the page keeps accepting records, so it is not promoted
        assert_eq!(flash.page_marker(0), common::MARKER_USED);
    }

    #[test]
    fn requires_a_read_cursor() {
        let mut flash = common::Flash::new(8);
        let cfg = common::config(FullPolicy::StopWhenFull);
        let mut log = Ringlog::mount(cfg, &mut flash).unwrap();

        assert_eq!(log.is_archived(), Err(Error::NoRecord));
        assert_eq!(log.set_archived(), Err(Error::NoRecord));

        // an append alone does not position the cursor either
        log.append(&common::payload(0)).unwrap();
        assert_eq!(log.set_archived(), Err(Error::NoRecord));
    }

    #[test]
    fn page_promotion() {
        let mut flash = common::Flash::new(8);
        let cfg = common::config(FullPolicy::StopWhenFull);
        let mut log = Ringlog::mount(cfg, &mut flash).unwrap();

        for i in 0..4u8 {
            log.append(&common::payload(i)).unwrap();
        }

        let mut buf = [0u8; common::PAYLOAD_SIZE];
        log.read_first(&mut buf).unwrap();
        log.set_archived().unwrap();
        log.read_next(&mut buf).unwrap();
        log.set_archived().unwrap();
        assert_eq!(log.statistics().unwrap().archived_pages, 0);

        // archiving the last record of page 0 promotes the whole page
        log.read_next(&mut buf).unwrap();
        log.set_archived().unwrap();
        let stats = log.statistics().unwrap();
        assert_eq!(stats.archived_pages, 1);
        assert_eq!(stats.used_pages, 1);

        // page 1 still has free slots; archiving its record promotes nothing
        log.read_next(&mut buf).unwrap();
        log.set_archived().unwrap();
        assert_eq!(log.statistics().unwrap().archived_pages, 1);
        drop(log);

        assert_eq!(flash.page_marker(0), common::MARKER_ARCHIVED);
        assert_eq!(flash.page_marker(1), common::MARKER_USED);
    }

    #[test]
    fn out_of_order_promotion() {
        let mut flash = common::Flash::new(8);
        let cfg = common::config(FullPolicy::StopWhenFull);
        let mut log = Ringlog::mount(cfg, &mut flash).unwrap();

        for i in 0..3u8 {
            log.append(&common::payload(i)).unwrap();
        }

        // newest, oldest, middle
        let mut buf = [0u8; common::PAYLOAD_SIZE];
        log.read_last(&mut buf).unwrap();
        log.set_archived().unwrap();
        log.read_previous(&mut buf).unwrap();
        log.read_previous(&mut buf).unwrap();
        assert_eq!(buf, common::payload(0));
        log.set_archived().unwrap();
        assert_eq!(log.statistics().unwrap().archived_pages, 0);

        log.read_next(&mut buf).unwrap();
        log.set_archived().unwrap();
        assert_eq!(log.statistics().unwrap().archived_pages, 1);
        drop(log);

        assert_eq!(flash.page_marker(0), common::MARKER_ARCHIVED);
    }

    #[test]
    fn archived_data_survives_remount() {
        let mut flash = common::Flash::new(8);
        let cfg = common::config(FullPolicy::StopWhenFull);

        let mut log = Ringlog::mount(cfg, &mut flash).unwrap();
        let mut buf = [0u8; common::PAYLOAD_SIZE];
        for i in 0..3u8 {
            log.append(&common::payload(i)).unwrap();
        }
        log.read_first(&mut buf).unwrap();
        log.set_archived().unwrap();
        for _ in 0..2 {
            log.read_next(&mut buf).unwrap();
            log.set_archived().unwrap();
        }
        drop(log);

        // a fully archived page is still live, readable and appendable-after
        let mut log = Ringlog::mount(cfg, &mut flash).unwrap();
        assert_eq!(log.statistics().unwrap().archived_pages, 1);
        log.read_first(&mut buf).unwrap();
        assert_eq!(buf, common::payload(0));
        assert_eq!(log.is_archived(), Ok(true));

        log.append(&common::payload(3)).unwrap();
        log.read_last(&mut buf).unwrap();
        assert_eq!(buf, common::payload(3));
        assert_eq!(log.is_archived(), Ok(false));
    }

    #[test]
    fn failing_archive_write_demotes_record() {
        let mut flash = common::Flash::new(8);
        // the archive bit of the first record marker of page 0 is stuck at one;
        // the initial record write never clears it, archiving must
        flash.stick_bits(common::PAGE_HEADER_SIZE, 0x02);

        let cfg = common::config(FullPolicy::StopWhenFull);
        let mut log = Ringlog::mount(cfg, &mut flash).unwrap();

        log.append(&common::payload(0)).unwrap();
        log.append(&common::payload(1)).unwrap();

        let mut buf = [0u8; common::PAYLOAD_SIZE];
        log.read_first(&mut buf).unwrap();
        assert_eq!(buf, common::payload(0));
        assert_eq!(log.set_archived(), Err(Error::WriteFail));

        // the record could not take the flag and was demoted instead
        log.read_first(&mut buf).unwrap();
        assert_eq!(buf, common::payload(1));
    }
}
