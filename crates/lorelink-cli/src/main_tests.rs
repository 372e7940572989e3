//! CLI tests

use clap::{CommandFactory, Parser};

use crate::{Cli, Commands, ConfigAction, OutputFormat};

#[test]
fn test_cli_definition_is_valid() {
    Cli::command().debug_assert();
}

#[test]
fn test_global_flags() {
    let cli = Cli::try_parse_from([
        "lorelink", "graphs", "--db", "/tmp/story.db", "--format", "json", "-v",
    ])
    .unwrap();
    assert!(matches!(cli.command, Commands::Graphs));
    assert_eq!(cli.db.as_deref(), Some(std::path::Path::new("/tmp/story.db")));
    assert!(cli.format == OutputFormat::Json);
    assert!(cli.verbose);
}

#[test]
fn test_predict_pair_takes_two_ids() {
    let cli = Cli::try_parse_from(["lorelink", "predict", "saga", "--pair", "aria", "kael"]).unwrap();
    match cli.command {
        Commands::Predict { graph, pair, entity, limit } => {
            assert_eq!(graph, "saga");
            assert_eq!(pair, Some(vec!["aria".to_string(), "kael".to_string()]));
            assert_eq!(entity, None);
            assert_eq!(limit, 20);
        }
        _ => panic!("expected predict"),
    }

    assert!(Cli::try_parse_from(["lorelink", "predict", "saga", "--pair", "aria"]).is_err());
    assert!(
        Cli::try_parse_from(["lorelink", "predict", "saga", "--pair", "a", "b", "--entity", "c"])
            .is_err()
    );
}

#[test]
fn test_feedback_options() {
    let cli = Cli::try_parse_from([
        "lorelink",
        "feedback",
        "s-1",
        "modify",
        "--corrected-type",
        "rival",
        "--strength",
        "70",
    ])
    .unwrap();
    match cli.command {
        Commands::Feedback { suggestion_id, action, user, corrected_type, strength, .. } => {
            assert_eq!(suggestion_id, "s-1");
            assert_eq!(action, "modify");
            assert_eq!(user, "cli");
            assert_eq!(corrected_type.as_deref(), Some("rival"));
            assert_eq!(strength, Some(70));
        }
        _ => panic!("expected feedback"),
    }
}

#[test]
fn test_config_subcommands() {
    let cli = Cli::try_parse_from(["lorelink", "config", "init", "--force"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Config { action: ConfigAction::Init { force: true } }
    ));

    let cli = Cli::try_parse_from(["lorelink", "reset-learning", "saga"]).unwrap();
    assert!(matches!(cli.command, Commands::ResetLearning { ref graph } if graph == "saga"));
}
