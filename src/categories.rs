//! Membership categories and their display labels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Membership category chosen at registration. Serialized as its slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Supporters,
    EmployeesAndVolunteers,
    BeneficiaryProducers,
    Partners,
    Experts,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Self; 5] = [
        Self::Supporters,
        Self::EmployeesAndVolunteers,
        Self::BeneficiaryProducers,
        Self::Partners,
        Self::Experts,
    ];

    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::Supporters => "supporters",
            Self::EmployeesAndVolunteers => "employees_and_volunteers",
            Self::BeneficiaryProducers => "beneficiary_producers",
            Self::Partners => "partners",
            Self::Experts => "experts",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Supporters => "Soutiens",
            Self::EmployeesAndVolunteers => "Salarié.e.s et producteur.ice.s bénévoles",
            Self::BeneficiaryProducers => "Producteur.rice.s bénéficiaires",
            Self::Partners => "Partenaires techniques et financiers",
            Self::Experts => "Expert.e.s en pratique contraceptive",
        }
    }

    /// The service rejects registrations without a reason for every category
    /// except supporters.
    #[must_use]
    pub fn requires_reason(self) -> bool {
        !matches!(self, Self::Supporters)
    }
}

/// Label for a category slug, `None` for unknown slugs.
#[must_use]
pub fn label(slug: &str) -> Option<&'static str> {
    slug.parse::<Category>().ok().map(Category::label)
}

#[must_use]
pub fn is_known(slug: &str) -> bool {
    slug.parse::<Category>().is_ok()
}

/// `(slug, label)` pairs in display order.
pub fn all() -> impl Iterator<Item = (&'static str, &'static str)> {
    Category::ALL.into_iter().map(|c| (c.slug(), c.label()))
}

#[derive(Debug, thiserror::Error)]
#[error("unknown category `{0}`")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.slug() == s)
            .ok_or_else(|| UnknownCategory(s.to_owned()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[cfg(test)]
#[path = "categories_test.rs"]
mod tests;
