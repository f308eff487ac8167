//! XBRL concept aliases for canonical fields.
//!
//! Filers use different concepts for the same line item, and foreign private
//! issuers report under `ifrs-full`. Each canonical field maps to an ordered
//! alias list; earlier aliases win ties at the same period end.

use facts_core::CanonicalField;

/// Qualified concept names for `field`, in preference order.
#[must_use]
pub const fn aliases(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::TotalAssets => &["us-gaap:Assets", "ifrs-full:Assets"],
        CanonicalField::CurrentAssets => &["us-gaap:AssetsCurrent", "ifrs-full:CurrentAssets"],
        CanonicalField::CurrentLiabilities => {
            &["us-gaap:LiabilitiesCurrent", "ifrs-full:CurrentLiabilities"]
        }
        CanonicalField::RetainedEarnings => &[
            "us-gaap:RetainedEarningsAccumulatedDeficit",
            "ifrs-full:RetainedEarnings",
        ],
        CanonicalField::Ebit => &[
            "us-gaap:OperatingIncomeLoss",
            "us-gaap:IncomeLossFromContinuingOperationsBeforeIncomeTaxesExtraordinaryItemsNoncontrollingInterest",
            "us-gaap:IncomeLossFromContinuingOperationsBeforeIncomeTaxesMinorityInterestAndIncomeLossFromEquityMethodInvestments",
            "ifrs-full:ProfitLossFromOperatingActivities",
            "ifrs-full:ProfitLossBeforeTax",
        ],
        CanonicalField::Revenue => &[
            "us-gaap:Revenues",
            "us-gaap:RevenueFromContractWithCustomerExcludingAssessedTax",
            "us-gaap:SalesRevenueNet",
            "us-gaap:RevenueFromContractWithCustomerIncludingAssessedTax",
            "ifrs-full:Revenue",
        ],
        CanonicalField::TotalLiabilities => &["us-gaap:Liabilities", "ifrs-full:Liabilities"],
        CanonicalField::StockholdersEquity => &[
            "us-gaap:StockholdersEquity",
            "us-gaap:StockholdersEquityIncludingPortionAttributableToNoncontrollingInterest",
            "ifrs-full:EquityAttributableToOwnersOfParent",
            "ifrs-full:Equity",
        ],
        CanonicalField::NetIncome => &[
            "us-gaap:NetIncomeLoss",
            "us-gaap:ProfitLoss",
            "us-gaap:NetIncomeLossAvailableToCommonStockholdersBasic",
            "ifrs-full:ProfitLossAttributableToOwnersOfParent",
            "ifrs-full:ProfitLoss",
        ],
        CanonicalField::SharesOutstanding => &[
            "us-gaap:CommonStockSharesOutstanding",
            "dei:EntityCommonStockSharesOutstanding",
            "us-gaap:CommonStockSharesIssued",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_field_has_aliases() {
        for field in CanonicalField::ALL {
            assert!(!aliases(field).is_empty(), "{field} has no aliases");
        }
    }

    #[test]
    fn test_aliases_cover_both_taxonomies() {
        for field in CanonicalField::CRITICAL {
            let list = aliases(field);
            assert!(list.iter().any(|a| a.starts_with("us-gaap:")));
            assert!(list.iter().any(|a| a.starts_with("ifrs-full:")));
        }
    }

    #[test]
    fn test_liabilities_excludes_balance_total() {
        assert!(
            !aliases(CanonicalField::TotalLiabilities)
                .contains(&"us-gaap:LiabilitiesAndStockholdersEquity")
        );
    }
}
