use figment::Jail;
use stm_config::Stix2MispConfig;

#[test]
fn env_overrides_translate_values() {
    Jail::expect_with(|jail| {
        jail.set_env("STIX2MISP_TRANSLATE__CUSTOM_FIELD_PREFIX", "x_other_");
        jail.set_env("STIX2MISP_TRANSLATE__OBSERVABLE_TO_IDS", "true");

        let config = Stix2MispConfig::load().expect("config loads");
        assert_eq!(config.translate.custom_field_prefix, "x_other_");
        assert!(config.translate.observable_to_ids);
        Ok(())
    });
}

#[test]
fn env_beats_project_file() {
    Jail::expect_with(|jail| {
        jail.create_dir(".stix2misp")?;
        jail.create_file(
            ".stix2misp/config.toml",
            "[general]\noutput_suffix = \".from-file\"\n",
        )?;
        jail.set_env("STIX2MISP_GENERAL__OUTPUT_SUFFIX", ".from-env");

        let config = Stix2MispConfig::load().expect("config loads");
        assert_eq!(config.general.output_suffix, ".from-env");
        Ok(())
    });
}

#[test]
fn env_beats_explicit_file() {
    Jail::expect_with(|jail| {
        jail.create_file("custom.toml", "[translate]\npattern_to_ids = true\n")?;
        jail.set_env("STIX2MISP_TRANSLATE__PATTERN_TO_IDS", "false");

        let config = Stix2MispConfig::load_with_file(Some(std::path::Path::new("custom.toml")))
            .expect("config loads");
        assert!(!config.translate.pattern_to_ids);
        Ok(())
    });
}

#[test]
fn invalid_env_value_is_reported() {
    Jail::expect_with(|jail| {
        jail.set_env("STIX2MISP_GENERAL__OUTPUT_SUFFIX", "out/dir");

        assert!(Stix2MispConfig::load().is_err());
        Ok(())
    });
}
