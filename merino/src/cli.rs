//! Command line arguments.

use clap::{Args, Parser, Subcommand};
use merino_suggest::Location;

/// Developer tools for Merino's integrations.
///
/// Settings are read from `config/` and `MERINO_*` environment variables.
#[derive(Parser, Debug)]
#[command(name = "merino")]
#[command(version)]
pub struct Cli {
    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// The available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Look up the weather for a location, as Firefox Suggest would see it,
    /// and print the report as JSON.
    Weather(WeatherArgs),
}

/// A location, as the geolocation collaborator would report it.
#[derive(Args, Debug)]
pub struct WeatherArgs {
    /// Country code, such as `CA` or `IT`.
    #[arg(long)]
    pub country: Option<String>,

    /// Subdivision codes, most specific first. May be repeated.
    ///
    /// Example: `--region MT --region 77`
    #[arg(long = "region", value_name = "REGION")]
    pub regions: Vec<String>,

    /// City name.
    #[arg(long)]
    pub city: Option<String>,

    /// Postal code.
    #[arg(long)]
    pub postal_code: Option<String>,
}

impl WeatherArgs {
    /// The location described by the arguments.
    pub fn location(&self) -> Location {
        Location {
            country: self.country.clone(),
            regions: self.regions.clone(),
            city: self.city.clone(),
            postal_code: self.postal_code.clone(),
            coordinates: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::{CommandFactory, Parser};
    use pretty_assertions::assert_eq;

    #[test]
    fn arguments_are_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn regions_keep_their_order() {
        let cli = Cli::parse_from([
            "merino",
            "weather",
            "--country",
            "IT",
            "--region",
            "MT",
            "--region",
            "77",
            "--city",
            "Matera",
            "--postal-code",
            "75100",
        ]);
        let Command::Weather(args) = cli.command;
        let location = args.location();
        assert_eq!(location.country.as_deref(), Some("IT"));
        assert_eq!(location.regions, vec!["MT", "77"]);
        assert_eq!(location.city.as_deref(), Some("Matera"));
        assert_eq!(location.postal_code.as_deref(), Some("75100"));
    }

    #[test]
    fn missing_fields_stay_missing() {
        let cli = Cli::parse_from(["merino", "weather", "--country", "CA"]);
        let Command::Weather(args) = cli.command;
        let location = args.location();
        assert_eq!(location.city, None);
        assert!(location.regions.is_empty());
    }

    #[test]
    fn a_command_is_required() {
        assert!(Cli::try_parse_from(["merino"]).is_err());
    }
}
