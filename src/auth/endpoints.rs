/// URL endpoints for the Zoho accounts server and the APIs behind it.
/// Each data center has its own accounts and API hosts.
use crate::types::Domain;

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub accounts: String,
    pub crm: String,
    pub books: String,
}

impl Endpoints {
    /// Returns the endpoints for the given data center.
    pub fn for_domain(domain: Domain) -> Self {
        let suffix = domain.as_str();
        Self {
            accounts: format!("https://accounts.zoho.{}", suffix),
            crm: format!("https://www.zohoapis.{}/crm/v7", suffix),
            books: format!("https://www.zohoapis.{}/books/v3", suffix),
        }
    }

    /// Browser-facing consent page.
    pub fn authorize_url(&self) -> String {
        format!("{}/oauth/v2/auth", self.accounts)
    }

    /// Token endpoint for both the authorization-code and refresh grants.
    pub fn token_url(&self) -> String {
        format!("{}/oauth/v2/token", self.accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_com_endpoints() {
        let ep = Endpoints::for_domain(Domain::Com);
        assert_eq!(ep.token_url(), "https://accounts.zoho.com/oauth/v2/token");
        assert_eq!(ep.crm, "https://www.zohoapis.com/crm/v7");
        assert_eq!(ep.books, "https://www.zohoapis.com/books/v3");
    }

    #[test]
    fn test_regional_endpoints() {
        let ep = Endpoints::for_domain(Domain::Eu);
        assert_eq!(ep.authorize_url(), "https://accounts.zoho.eu/oauth/v2/auth");
        let ep = Endpoints::for_domain(Domain::ComAu);
        assert_eq!(ep.crm, "https://www.zohoapis.com.au/crm/v7");
    }
}
