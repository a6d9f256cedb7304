#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime};

    use ndarray::{s, Array1, Array2, Array3, Array4, ArrayD};
    use ndarray_npy::NpzWriter;
    use stella_post::cache;
    use stella_post::{
        ArchiveGeometry, BatchReport, CacheStatus, Collaborators, DistributionDriver,
        DriverConfig, InputMetadata, InputMetadataReader, NamelistReader, NpzArchiveOpener,
        ProcessStatus, Result, WalkdirEnumerator,
    };

    const NS: usize = 1;
    const NMU: usize = 2;
    const NVPA: usize = 3;
    const NZ: usize = 4;

    const NONLINEAR_INPUT: &str = "&physics_flags\n  nonlinear = .true.\n/\n\
        &vmec_parameters\n  vmec_filename = 'wout_w7x.nc'\n/\n";
    const LINEAR_INPUT: &str = "&physics_flags\n  nonlinear = .false.\n/\n";

    // ========== Fixtures ==========

    struct Run {
        input: PathBuf,
        archive: PathBuf,
        cache: PathBuf,
    }

    impl Run {
        fn new(folder: &Path, name: &str, input_text: &str) -> Self {
            fs::create_dir_all(folder).unwrap();
            let input = folder.join(format!("{name}.in"));
            fs::write(&input, input_text).unwrap();
            Self {
                archive: folder.join(format!("{name}.out.nc")),
                cache: folder.join(format!("{name}.dt10.distribution3D")),
                input,
            }
        }
    }

    /// Archive with one output per unit time from 0 to `last`; g = t + 1.
    fn write_archive(path: &Path, last: usize, with_diagnostics: bool, with_geometry: bool) {
        let nt = last + 1;
        let mut arrays: Vec<(&str, ArrayD<f64>)> = vec![
            ("vec_time", Array1::from_iter((0..nt).map(|t| t as f64)).into_dyn()),
            (
                "g_vs_tsmuvpa",
                Array4::from_shape_fn((nt, NS, NMU, NVPA), |(t, _, _, _)| t as f64 + 1.0)
                    .into_dyn(),
            ),
            ("g_vs_tsvpaz", Array4::<f64>::zeros((nt, NS, NVPA, NZ)).into_dyn()),
        ];
        if with_diagnostics {
            arrays.push(("gvmus", Array1::<f64>::zeros(1).into_dyn()));
            arrays.push(("gzvs", Array1::<f64>::zeros(1).into_dyn()));
        }
        if with_geometry {
            arrays.push(("mu_weights", Array2::<f64>::ones((NZ, NMU)).into_dyn()));
            arrays.push(("vpa_weights", Array1::<f64>::ones(NVPA).into_dyn()));
            arrays.push(("dl_over_B", Array1::<f64>::ones(NZ).into_dyn()));
        }

        write_npz(path, &arrays);
    }

    fn write_npz(path: &Path, arrays: &[(&str, ArrayD<f64>)]) {
        let mut npz = NpzWriter::new(File::create(path).unwrap());
        for (name, array) in arrays {
            npz.add_array(*name, array).unwrap();
        }
        npz.finish().unwrap();
    }

    /// Write cache datasets as given, bypassing the store's validation.
    #[cfg(not(feature = "netcdf4"))]
    fn write_raw_cache(path: &Path, arrays: &[(&str, ArrayD<f64>)]) {
        write_npz(path, arrays);
    }

    #[cfg(feature = "netcdf4")]
    fn write_raw_cache(path: &Path, arrays: &[(&str, ArrayD<f64>)]) {
        let file = hdf5::File::create(path).unwrap();
        for (name, array) in arrays {
            file.new_dataset::<f64>()
                .shape(array.shape().to_vec())
                .create(*name)
                .unwrap()
                .write(array)
                .unwrap();
        }
    }

    fn set_mtime(path: &Path, when: SystemTime) {
        File::options().write(true).open(path).unwrap().set_modified(when).unwrap();
    }

    /// Make the archive newer than the cache.
    fn age_cache(run: &Run) {
        let now = SystemTime::now();
        set_mtime(&run.cache, now - Duration::from_secs(120));
        set_mtime(&run.archive, now);
    }

    fn run_batch_with(folder: &Path, config: DriverConfig) -> BatchReport {
        let archives = NpzArchiveOpener;
        let geometry = ArchiveGeometry::new(&archives);
        let collaborators = Collaborators {
            inputs: &NamelistReader,
            archives: &archives,
            geometry: &geometry,
            files: &WalkdirEnumerator,
        };
        DistributionDriver::new(config, collaborators).run(folder).unwrap()
    }

    fn run_batch(folder: &Path) -> BatchReport {
        run_batch_with(folder, DriverConfig::default())
    }

    fn status(report: &BatchReport, run: &Run) -> ProcessStatus {
        report.status_of(&run.input).cloned().unwrap()
    }

    // ========== Fresh Caches ==========

    #[test]
    fn test_fresh_cache_is_saved_at_stride() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(&dir.path().join("scan"), "w7x", NONLINEAR_INPUT);
        write_archive(&run.archive, 100, true, true);

        let report = run_batch(dir.path());
        assert_eq!(status(&report, &run), ProcessStatus::Saved);
        assert_eq!(report.outcomes[0].time_points, Some(11));

        let data = cache::read_all(&run.cache).unwrap();
        assert_eq!(data.len(), 11);
        assert_eq!(data.time[10], 100.0);
        assert_eq!((data.species(), data.nz(), data.nmu(), data.nvpa()), (NS, NZ, NMU, NVPA));
        // Unit weights: g_vs_tsz = (t + 1) * nmu * nvpa.
        assert_eq!(data.g_vs_tsz[[3, 0, 2]], 31.0 * (NMU * NVPA) as f64);
        assert_eq!(data.g_vs_tsmu[[1, 0, 0]], 11.0 * (NVPA * NZ) as f64);
    }

    #[test]
    fn test_second_run_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(dir.path(), "w7x", NONLINEAR_INPUT);
        write_archive(&run.archive, 100, true, true);

        run_batch(dir.path());
        let before = fs::read(&run.cache).unwrap();

        let report = run_batch(dir.path());
        assert_eq!(status(&report, &run), ProcessStatus::AlreadyExists);
        assert_eq!(report.outcomes[0].time_points, None);
        assert_eq!(fs::read(&run.cache).unwrap(), before);
    }

    #[test]
    fn test_corrupt_cache_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(dir.path(), "w7x", NONLINEAR_INPUT);
        write_archive(&run.archive, 50, true, true);
        fs::write(&run.cache, b"not an npz file").unwrap();
        age_cache(&run);

        let report = run_batch(dir.path());
        assert_eq!(status(&report, &run), ProcessStatus::Saved);
        assert_eq!(cache::read_all(&run.cache).unwrap().len(), 6);
    }

    #[test]
    fn test_cache_with_damaged_arrays_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(dir.path(), "w7x", NONLINEAR_INPUT);
        write_archive(&run.archive, 100, true, true);
        // Time axis reads fine, so the cache classifies as appendable.
        write_raw_cache(
            &run.cache,
            &[
                ("vec_time", Array1::from_vec(vec![0.0, 10.0, 20.0, 30.0, 40.0]).into_dyn()),
                ("g_vs_tsz", Array3::<f64>::zeros((3, NS, NZ)).into_dyn()),
                ("g_vs_tsmu", Array3::<f64>::zeros((5, NS, NMU)).into_dyn()),
                ("g_vs_tsvpa", Array3::<f64>::zeros((5, NS, NVPA)).into_dyn()),
            ],
        );
        age_cache(&run);
        assert_eq!(cache::last_time(&run.cache).unwrap(), Some(40.0));

        let report = run_batch(dir.path());
        assert_eq!(status(&report, &run), ProcessStatus::Saved);
        assert_eq!(report.outcomes[0].time_points, Some(11));
        assert!(!report.has_failures());

        let rebuilt = cache::read_all(&run.cache).unwrap();
        assert_eq!(rebuilt.len(), 11);
        assert_eq!(rebuilt.g_vs_tsz[[4, 0, 0]], 41.0 * (NMU * NVPA) as f64);

        let report = run_batch(dir.path());
        assert_eq!(status(&report, &run), ProcessStatus::AlreadyExists);
    }

    // ========== Incremental Updates ==========

    #[test]
    fn test_longer_archive_appends_new_points() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(dir.path(), "w7x", NONLINEAR_INPUT);
        write_archive(&run.archive, 100, true, true);
        run_batch(dir.path());
        let first = cache::read_all(&run.cache).unwrap();

        write_archive(&run.archive, 150, true, true);
        age_cache(&run);
        let report = run_batch(dir.path());
        assert_eq!(status(&report, &run), ProcessStatus::Updated);
        assert_eq!(report.outcomes[0].time_points, Some(16));

        let merged = cache::read_all(&run.cache).unwrap();
        assert_eq!(merged.len(), 16);
        assert_eq!(merged.time[15], 150.0);
        assert_eq!(merged.time.slice(s![..11]), first.time);
        assert_eq!(merged.g_vs_tsz.slice(s![..11, .., ..]), first.g_vs_tsz);
        assert_eq!(merged.g_vs_tsvpa.slice(s![..11, .., ..]), first.g_vs_tsvpa);
    }

    #[test]
    fn test_newer_archive_without_new_points_only_touches() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(dir.path(), "w7x", NONLINEAR_INPUT);
        write_archive(&run.archive, 100, true, true);
        run_batch(dir.path());
        let before = fs::read(&run.cache).unwrap();

        // 105 adds no point on the dt = 10 grid.
        write_archive(&run.archive, 105, true, true);
        age_cache(&run);
        let report = run_batch(dir.path());
        assert_eq!(status(&report, &run), ProcessStatus::UpToDate);
        assert_eq!(fs::read(&run.cache).unwrap(), before);

        let cache_mtime = fs::metadata(&run.cache).unwrap().modified().unwrap();
        let archive_mtime = fs::metadata(&run.archive).unwrap().modified().unwrap();
        assert!(cache_mtime >= archive_mtime, "cache was not touched");

        let report = run_batch(dir.path());
        assert_eq!(status(&report, &run), ProcessStatus::AlreadyExists);
    }

    // ========== Skips and Failures ==========

    #[test]
    fn test_linear_runs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(dir.path(), "linear", LINEAR_INPUT);
        write_archive(&run.archive, 100, true, true);

        let report = run_batch(dir.path());
        assert_eq!(status(&report, &run), ProcessStatus::SkippedLinear);
        assert!(!run.cache.exists());
    }

    #[test]
    fn test_runs_without_distribution_output_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(dir.path(), "nogvmus", NONLINEAR_INPUT);
        write_archive(&run.archive, 100, false, true);

        let report = run_batch(dir.path());
        assert_eq!(status(&report, &run), ProcessStatus::SkippedMissingVariables);
        assert!(!run.cache.exists());
    }

    #[test]
    fn test_inputs_without_archive_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        Run::new(dir.path(), "pending", NONLINEAR_INPUT);

        let report = run_batch(dir.path());
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn test_empty_folder_gives_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_batch(dir.path());
        assert!(report.outcomes.is_empty());
        assert!(!report.has_failures());
        assert_eq!(report.stride, "10");
    }

    #[test]
    fn test_failure_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let broken = Run::new(dir.path(), "a_broken", NONLINEAR_INPUT);
        write_archive(&broken.archive, 100, true, false);
        let good = Run::new(dir.path(), "b_good", NONLINEAR_INPUT);
        write_archive(&good.archive, 100, true, true);

        let report = run_batch(dir.path());
        assert!(matches!(status(&report, &broken), ProcessStatus::Failed(_)));
        assert_eq!(status(&report, &good), ProcessStatus::Saved);
        assert!(report.has_failures());
        assert!(!broken.cache.exists());

        let counts = report.counts();
        assert_eq!((counts.saved, counts.failed), (1, 1));
    }

    // ========== Configuration ==========

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(dir.path(), "w7x", NONLINEAR_INPUT);
        write_archive(&run.archive, 100, true, true);

        let config = DriverConfig {
            dry_run: true,
            ..DriverConfig::default()
        };
        let report = run_batch_with(dir.path(), config);
        assert_eq!(status(&report, &run), ProcessStatus::Planned(CacheStatus::Missing));
        assert!(!run.cache.exists());
    }

    #[test]
    fn test_stride_names_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(dir.path(), "w7x", NONLINEAR_INPUT);
        write_archive(&run.archive, 20, true, true);

        let config = DriverConfig {
            stride: stella_post::Stride::new(2.5).unwrap(),
            ..DriverConfig::default()
        };
        let report = run_batch_with(dir.path(), config);
        assert_eq!(status(&report, &run), ProcessStatus::Saved);

        // t = 0, 3, 6, ... 18 on an integer time grid with dt = 2.5.
        let cache_file = dir.path().join("w7x.dt2.5.distribution3D");
        let data = cache::read_all(&cache_file).unwrap();
        assert_eq!(data.time.to_vec(), vec![0.0, 3.0, 6.0, 9.0, 12.0, 15.0, 18.0]);
    }

    /// Treats every input as nonlinear without reading it.
    struct AlwaysNonlinear;

    impl InputMetadataReader for AlwaysNonlinear {
        fn read(&self, _path: &Path) -> Result<InputMetadata> {
            Ok(InputMetadata {
                vmec_filename: None,
                nonlinear: true,
            })
        }
    }

    #[test]
    fn test_custom_input_reader_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(dir.path(), "flagged_linear", LINEAR_INPUT);
        write_archive(&run.archive, 30, true, true);

        let archives = NpzArchiveOpener;
        let geometry = ArchiveGeometry::new(&archives);
        let collaborators = Collaborators {
            inputs: &AlwaysNonlinear,
            archives: &archives,
            geometry: &geometry,
            files: &WalkdirEnumerator,
        };
        let report = DistributionDriver::new(DriverConfig::default(), collaborators)
            .run(dir.path())
            .unwrap();
        assert_eq!(status(&report, &run), ProcessStatus::Saved);
        assert_eq!(cache::read_all(&run.cache).unwrap().len(), 4);
    }
}
