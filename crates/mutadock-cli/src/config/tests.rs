#[cfg(test)]
mod tests {
    use super::super::*;
    use mutadock_molecules::scoring::{ConsensusMethod, ScorerKind};
    use mutadock_molecules::settings::ProviderKind;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.engines.vina, PathBuf::from("vina"));
        assert_eq!(config.engines.probe_timeout_secs, 5);
        assert_eq!(config.relax.stiffness, 500.0);
        assert_eq!(config.grid.buffer, 6.0);
        assert_eq!(config.preparation.ph, 7.4);
        assert_eq!(config.scoring.method, ConsensusMethod::Mean);
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let config = Config::from_toml_str(
            r#"
            [engines]
            vina = "/opt/vina/bin/vina"
            exhaustiveness = 32

            [scoring]
            method = "weighted"

            [[scoring.scorers]]
            name = "vina"
            kind = "vina"
            executable = "/opt/vina/bin/vina"
            primary = true

            [[scoring.scorers]]
            name = "cnn"
            kind = "gnina"
            executable = "gnina"

            [preparation]
            providers = ["obabel"]
            ph = 6.5
            "#,
        )
        .unwrap();

        assert_eq!(config.engines.exhaustiveness, 32);
        assert_eq!(config.engines.cpu, 4);
        assert_eq!(config.scoring.method, ConsensusMethod::Weighted);
        assert_eq!(config.scoring.scorers.len(), 2);
        assert_eq!(config.scoring.scorers[1].kind, ScorerKind::Gnina);
        assert_eq!(config.scoring.scorers[1].timeout_secs, 120);
        assert_eq!(config.preparation.providers, vec![ProviderKind::Obabel]);
        assert_eq!(config.preparation.obabel, PathBuf::from("obabel"));

        let pipeline = config.pipeline();
        assert_eq!(pipeline.engines.vina, PathBuf::from("/opt/vina/bin/vina"));
        assert_eq!(pipeline.preparation.ph, 6.5);
    }

    #[test]
    fn test_rejects_negative_buffer_and_two_primaries() {
        assert!(Config::from_toml_str("[grid]\nbuffer = -1.0\n").is_err());

        let two_primaries = r#"
            [[scoring.scorers]]
            name = "a"
            kind = "vina"
            executable = "vina"
            primary = true

            [[scoring.scorers]]
            name = "b"
            kind = "vina"
            executable = "vina2"
            primary = true
        "#;
        assert!(Config::from_toml_str(two_primaries).is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(config.engines.num_modes, 9);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mutadock.toml");
        std::fs::write(&path, "[relax]\nmax_iterations = 250\n").unwrap();
        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.relax.max_iterations, 250);
        assert_eq!(config.relax.energy_warning_threshold, 10.0);
    }
}
