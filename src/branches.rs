//! Read-only lookup of delivery-partner branch contacts (BranchNumbers
//! sheet). Maintained by hand in the spreadsheet; this crate has no write
//! path for it.

use crate::codec::branch_from_row;
use crate::models::BranchContact;
use crate::sheets::{Sheet, SheetsClient};

pub async fn list(client: &SheetsClient) -> Result<Vec<BranchContact>, String> {
    let rows = client
        .list(Sheet::BranchNumbers)
        .await
        .map_err(|e| e.to_string())?;
    Ok(rows.iter().map(|row| branch_from_row(row)).collect())
}

/// Case-insensitive substring match on the branch name, so "negombo" finds
/// "Negombo Main Branch".
pub fn find<'a>(branches: &'a [BranchContact], query: &str) -> Vec<&'a BranchContact> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    branches
        .iter()
        .filter(|b| b.branch.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(name: &str) -> BranchContact {
        BranchContact {
            id: String::new(),
            branch: name.to_string(),
            phone1: "0111234567".into(),
            phone2: String::new(),
            phone3: String::new(),
            note: String::new(),
        }
    }

    #[test]
    fn lookup_matches_substrings_case_insensitively() {
        let branches = vec![branch("Negombo Main Branch"), branch("Galle"), branch("Kandy")];
        let hits = find(&branches, "negombo");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].branch, "Negombo Main Branch");
        assert!(find(&branches, "colombo").is_empty());
        assert!(find(&branches, "  ").is_empty());
    }
}
