use clap::{Args, Parser, Subcommand};
use ds_query::{FilterSpec, OrderSpec, Query, Result};

/// One line typed at the shell prompt.
#[derive(Parser, Debug)]
#[command(
    name = "dshell",
    no_binary_name = true,
    disable_version_flag = true,
    subcommand_required = true
)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: ShellCommand,
}

#[derive(Subcommand, Debug)]
pub enum ShellCommand {
    /// Open a datastore, closing the one currently open
    Open {
        /// Kind of datastore (see `kinds`)
        kind: String,

        /// Location of the datastore; a leading '~' is expanded
        path: String,
    },

    /// Close the open datastore
    Close,

    /// List the kinds of datastore that can be opened
    Kinds,

    /// Print the value stored under a key
    Get {
        /// Write the raw bytes instead of text
        #[arg(short, long)]
        binary: bool,

        /// Write the value to this file instead of printing it
        #[arg(long)]
        save: Option<String>,

        key: String,
    },

    /// Store a value under a key
    Put {
        /// Read the value from this file
        #[arg(long, conflicts_with = "value")]
        load: Option<String>,

        key: String,

        #[arg(required_unless_present = "load")]
        value: Option<String>,
    },

    /// Remove a key
    Del { key: String },

    /// Print whether a key is present
    Has { key: String },

    /// Flush writes under a key prefix to durable storage
    Sync {
        #[arg(default_value = "/")]
        key: String,
    },

    /// Print the size in bytes of the value under a key
    Size { key: String },

    /// Query entries under a key prefix
    Query(QueryArgs),

    /// Leave the shell
    #[command(alias = "quit")]
    Exit,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Only keys starting with this prefix are considered
    #[arg(default_value = "/")]
    pub prefix: String,

    /// Maximum number of entries to return (0 for no limit)
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    pub limit: i64,

    /// Number of matching entries to skip
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    pub offset: i64,

    /// Return keys without values
    #[arg(short, long)]
    pub keys_only: bool,

    /// Write values as raw bytes instead of text
    #[arg(short, long)]
    pub binary: bool,

    /// Write each value to <DIR>/<key> instead of printing it
    #[arg(long, value_name = "DIR")]
    pub save: Option<String>,

    /// Keep keys starting with this prefix
    #[arg(long)]
    pub fkp: Option<String>,

    /// Keep keys less than this
    #[arg(long)]
    pub fkl: Option<String>,

    /// Keep keys less than or equal to this
    #[arg(long)]
    pub fkle: Option<String>,

    /// Keep keys greater than this
    #[arg(long)]
    pub fkg: Option<String>,

    /// Keep keys greater than or equal to this
    #[arg(long)]
    pub fkge: Option<String>,

    /// Keep the key equal to this
    #[arg(long)]
    pub fke: Option<String>,

    /// Keep values less than this
    #[arg(long)]
    pub fvl: Option<String>,

    /// Keep values less than or equal to this
    #[arg(long)]
    pub fvle: Option<String>,

    /// Keep values greater than this
    #[arg(long)]
    pub fvg: Option<String>,

    /// Keep values greater than or equal to this
    #[arg(long)]
    pub fvge: Option<String>,

    /// Keep values equal to this
    #[arg(long)]
    pub fve: Option<String>,

    /// Additional filter, e.g. "value >= 10" or "key prefix /a"
    #[arg(long = "filter", value_name = "TARGET OP OPERAND")]
    pub filters: Vec<String>,

    /// Order by key
    #[arg(long)]
    pub ok: bool,

    /// Order by value
    #[arg(long)]
    pub ov: bool,

    /// Additional order, "key" or "value"; applied after --ok/--ov
    #[arg(long = "order", value_name = "key|value")]
    pub orders: Vec<String>,
}

impl QueryArgs {
    fn filter_specs(&self) -> Result<Vec<FilterSpec>> {
        let flags = [
            ("key", "prefix", &self.fkp),
            ("key", "<", &self.fkl),
            ("key", "<=", &self.fkle),
            ("key", ">", &self.fkg),
            ("key", ">=", &self.fkge),
            ("key", "==", &self.fke),
            ("value", "<", &self.fvl),
            ("value", "<=", &self.fvle),
            ("value", ">", &self.fvg),
            ("value", ">=", &self.fvge),
            ("value", "==", &self.fve),
        ];
        let mut specs: Vec<FilterSpec> = flags
            .into_iter()
            .filter_map(|(target, op, operand)| {
                operand
                    .as_ref()
                    .map(|operand| FilterSpec::new(target, op, operand.as_str()))
            })
            .collect();
        for filter in &self.filters {
            specs.push(filter.parse()?);
        }
        Ok(specs)
    }

    fn order_specs(&self) -> Result<Vec<OrderSpec>> {
        let mut specs = Vec::new();
        if self.ok {
            specs.push(OrderSpec::new("key"));
        }
        if self.ov {
            specs.push(OrderSpec::new("value"));
        }
        for order in &self.orders {
            specs.push(order.parse()?);
        }
        Ok(specs)
    }

    /// Translates the flags into a query.
    pub fn to_query(&self) -> Result<Query> {
        Query::build(
            &self.prefix,
            &self.filter_specs()?,
            &self.order_specs()?,
            self.offset,
            self.limit,
            self.keys_only,
        )
    }
}
