use clap::Parser;

/// The only help text the launcher ever prints.
pub const USAGE: &str = "ipcamera -i <inputport> -o <outputport>";

#[derive(Debug, Parser)]
#[command(name = "ipcamera", disable_help_flag = true, args_override_self = true)]
pub struct Configuration {
    #[arg(id = "help", short = 'h', action = clap::ArgAction::Help)]
    pub help: Option<bool>,
    ///Port the camera frames arrive on
    #[arg(short = 'i', long = "iport", default_value_t = 0)]
    pub input_port: u16,
    ///Port the frames are served from
    #[arg(short = 'o', long = "oport", default_value_t = 0)]
    pub output_port: u16,
    /// First operand and everything after it, never interpreted
    #[arg(trailing_var_arg = true, num_args = 1.., hide = true)]
    pub operands: Vec<String>,
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_command_is_well_formed() {
        Configuration::command().debug_assert();
    }

    #[test]
    fn test_attached_values() {
        let config =
            Configuration::try_parse_from(["ipcamera", "-i8080", "--oport=9090"]).unwrap();

        assert_eq!(config.input_port, 8080);
        assert_eq!(config.output_port, 9090);
        assert!(config.operands.is_empty());
    }
}
