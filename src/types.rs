/// Zoho data center the account lives in. Selects the accounts and API hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Domain {
    Com,
    Eu,
    In,
    #[value(name = "com.au")]
    ComAu,
    Jp,
    Ca,
    #[value(name = "com.cn")]
    ComCn,
}

impl Domain {
    pub fn as_str(&self) -> &str {
        match self {
            Domain::Com => "com",
            Domain::Eu => "eu",
            Domain::In => "in",
            Domain::ComAu => "com.au",
            Domain::Jp => "jp",
            Domain::Ca => "ca",
            Domain::ComCn => "com.cn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A record family that can be pulled from the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum SyncModule {
    Contacts,
    Products,
    Projects,
    Organizations,
}

impl SyncModule {
    /// Every module, ordered so that companies exist before projects reference them.
    pub const ALL: [SyncModule; 4] = [
        SyncModule::Organizations,
        SyncModule::Contacts,
        SyncModule::Products,
        SyncModule::Projects,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Products => "products",
            Self::Projects => "projects",
            Self::Organizations => "organizations",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_host_suffixes() {
        assert_eq!(Domain::Com.as_str(), "com");
        assert_eq!(Domain::ComAu.as_str(), "com.au");
        assert_eq!(Domain::ComCn.as_str(), "com.cn");
    }

    #[test]
    fn test_all_modules_puts_organizations_before_projects() {
        let orgs = SyncModule::ALL
            .iter()
            .position(|m| *m == SyncModule::Organizations)
            .unwrap();
        let projects = SyncModule::ALL
            .iter()
            .position(|m| *m == SyncModule::Projects)
            .unwrap();
        assert!(orgs < projects);
    }
}
