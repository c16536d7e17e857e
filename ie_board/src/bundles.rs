use abi::{Bundle, HierarchyNode, LeafNode, TokenAccountRecord};
use log::warn;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// Builds the two-level tree fed to the bubble map: non-empty bundles in
/// configured order, then the largest unbundled holders as flat leaves.
/// Never emits more than `target_leaf_count` leaves in total.
///
/// An address listed in more than one bundle goes to the first bundle that
/// lists it.
pub fn build_hierarchy(
    holders: &[TokenAccountRecord],
    bundles: &[Bundle],
    target_leaf_count: usize,
) -> Vec<HierarchyNode> {
    // Largest account per owner; holders are already sorted.
    let mut by_owner: HashMap<Pubkey, &TokenAccountRecord> = HashMap::new();
    for holder in holders {
        by_owner.entry(holder.owner).or_insert(holder);
    }

    let mut consumed: HashSet<Pubkey> = HashSet::new();
    let mut nodes = Vec::new();
    let mut leaf_count = 0;

    for bundle in bundles {
        let mut children = Vec::new();
        for address in &bundle.addresses {
            if leaf_count >= target_leaf_count {
                break;
            }
            if consumed.contains(address) {
                continue;
            }
            if let Some(record) = by_owner.get(address) {
                children.push(LeafNode::from_record(record));
                consumed.insert(*address);
                leaf_count += 1;
            }
        }
        if !children.is_empty() {
            nodes.push(HierarchyNode::Bundle {
                name: bundle.name.clone(),
                color: bundle.color.clone(),
                children,
            });
        }
    }

    for holder in holders {
        if leaf_count >= target_leaf_count {
            break;
        }
        if consumed.insert(holder.owner) {
            nodes.push(HierarchyNode::Leaf(LeafNode::from_record(holder)));
            leaf_count += 1;
        }
    }

    nodes
}

/// Addresses listed in more than one bundle, with the names of the bundles
/// listing them, in first-seen order.
pub fn bundle_overlaps(bundles: &[Bundle]) -> Vec<(Pubkey, Vec<String>)> {
    let mut seen: Vec<(Pubkey, Vec<String>)> = Vec::new();
    for bundle in bundles {
        for address in &bundle.addresses {
            match seen.iter_mut().find(|(a, _)| a == address) {
                Some((_, names)) => {
                    if !names.contains(&bundle.name) {
                        names.push(bundle.name.clone());
                    }
                }
                None => seen.push((*address, vec![bundle.name.clone()])),
            }
        }
    }
    seen.retain(|(_, names)| names.len() > 1);
    seen
}

/// Parses `name:color:addr,addr;name:color:addr`. Malformed groups and
/// addresses are logged and skipped.
pub fn parse_bundles(list: &str) -> Vec<Bundle> {
    let mut bundles = Vec::new();
    for group in list.split(';').map(str::trim).filter(|g| !g.is_empty()) {
        let mut parts = group.splitn(3, ':');
        let (name, color, addresses) = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(color), Some(addresses)) => (name.trim(), color.trim(), addresses),
            _ => {
                warn!("ignoring malformed bundle definition: {}", group);
                continue;
            }
        };

        let addresses = addresses
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .filter_map(|a| match Pubkey::from_str(a) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("bundle {}: ignoring address {}: {}", name, a, e);
                    None
                }
            })
            .collect();

        bundles.push(Bundle {
            name: name.to_string(),
            color: color.to_string(),
            addresses,
        });
    }

    for (address, names) in bundle_overlaps(&bundles) {
        warn!(
            "address {} is listed in bundles {:?}; it is shown under {}",
            address, names, names[0]
        );
    }
    bundles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holders::tests::record;

    fn bundle(name: &str, addresses: Vec<Pubkey>) -> Bundle {
        Bundle {
            name: name.to_string(),
            color: "#ffffff".to_string(),
            addresses,
        }
    }

    fn leaf_owners(nodes: &[HierarchyNode]) -> Vec<Pubkey> {
        let mut owners = Vec::new();
        for node in nodes {
            match node {
                HierarchyNode::Bundle { children, .. } => {
                    owners.extend(children.iter().map(|c| c.owner))
                }
                HierarchyNode::Leaf(leaf) => owners.push(leaf.owner),
            }
        }
        owners
    }

    #[test]
    fn bundle_precedes_larger_flat_holder() {
        let (a, b) = (Pubkey::new_unique(), Pubkey::new_unique());
        let holders = vec![record(b, 1500), record(a, 500)];
        let bundles = vec![bundle("Team", vec![a])];

        let tree = build_hierarchy(&holders, &bundles, 2);

        assert_eq!(
            tree,
            vec![
                HierarchyNode::Bundle {
                    name: "Team".into(),
                    color: "#ffffff".into(),
                    children: vec![LeafNode { name: a.to_string(), value: 500.0, owner: a }],
                },
                HierarchyNode::Leaf(LeafNode { name: b.to_string(), value: 1500.0, owner: b }),
            ]
        );
    }

    #[test]
    fn stops_at_target_leaf_count() {
        let owners: Vec<Pubkey> = (0..10).map(|_| Pubkey::new_unique()).collect();
        let holders: Vec<_> = owners.iter().enumerate().map(|(i, o)| record(*o, 100 - i as u64)).collect();
        let bundles = vec![bundle("Team", vec![owners[4], owners[7]])];

        let tree = build_hierarchy(&holders, &bundles, 5);

        let total: usize = tree.iter().map(HierarchyNode::leaf_count).sum();
        assert_eq!(total, 5);
        assert_eq!(leaf_owners(&tree), vec![owners[4], owners[7], owners[0], owners[1], owners[2]]);
    }

    #[test]
    fn bundled_address_is_never_a_flat_leaf() {
        let owners: Vec<Pubkey> = (0..6).map(|_| Pubkey::new_unique()).collect();
        let holders: Vec<_> = owners.iter().map(|o| record(*o, 10)).collect();
        let bundles = vec![bundle("Dev", vec![owners[0], owners[3]])];

        let tree = build_hierarchy(&holders, &bundles, 100);
        let all = leaf_owners(&tree);
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), unique.len());
        assert_eq!(all.len(), 6);
        match &tree[0] {
            HierarchyNode::Bundle { children, .. } => {
                let members: Vec<_> = children.iter().map(|c| c.owner).collect();
                assert_eq!(members, vec![owners[0], owners[3]]);
            }
            other => panic!("expected bundle first, got {:?}", other),
        }
    }

    #[test]
    fn bundle_without_holders_is_omitted() {
        let a = Pubkey::new_unique();
        let holders = vec![record(a, 10)];
        let bundles = vec![bundle("Ghost", vec![Pubkey::new_unique()])];

        let tree = build_hierarchy(&holders, &bundles, 10);
        assert_eq!(tree.len(), 1);
        assert!(matches!(tree[0], HierarchyNode::Leaf(_)));
    }

    #[test]
    fn bundle_cut_to_zero_by_target_is_omitted() {
        let (a, b) = (Pubkey::new_unique(), Pubkey::new_unique());
        let holders = vec![record(a, 10), record(b, 5)];
        let bundles = vec![bundle("First", vec![a]), bundle("Second", vec![b])];

        let tree = build_hierarchy(&holders, &bundles, 1);
        assert_eq!(tree.len(), 1);
        assert!(tree.iter().all(|n| n.leaf_count() > 0));
    }

    #[test]
    fn overlapping_address_goes_to_first_bundle() {
        let a = Pubkey::new_unique();
        let holders = vec![record(a, 10)];
        let bundles = vec![bundle("First", vec![a]), bundle("Second", vec![a])];

        let tree = build_hierarchy(&holders, &bundles, 10);
        assert_eq!(tree.len(), 1);
        match &tree[0] {
            HierarchyNode::Bundle { name, .. } => assert_eq!(name, "First"),
            other => panic!("unexpected node {:?}", other),
        }
        assert_eq!(bundle_overlaps(&bundles), vec![(a, vec!["First".to_string(), "Second".to_string()])]);
    }

    #[test]
    fn owner_with_several_accounts_appears_once() {
        let a = Pubkey::new_unique();
        let holders = vec![record(a, 30), record(a, 20)];
        let tree = build_hierarchy(&holders, &[], 10);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn rebuilding_is_idempotent() {
        let owners: Vec<Pubkey> = (0..8).map(|_| Pubkey::new_unique()).collect();
        let holders: Vec<_> = owners.iter().enumerate().map(|(i, o)| record(*o, 50 - i as u64)).collect();
        let bundles = vec![bundle("Team", vec![owners[2]]), bundle("Mkt", vec![owners[5], owners[6]])];

        let first = build_hierarchy(&holders, &bundles, 6);
        let second = build_hierarchy(&holders, &bundles, 6);
        assert_eq!(first, second);
    }

    #[test]
    fn parses_bundle_definitions() {
        let (a, b) = (Pubkey::new_unique(), Pubkey::new_unique());
        let list = format!("Team:#ff6b6b:{}, {};Broken; Mkt:#4ecdc4:{},not-a-key", a, b, b);

        let bundles = parse_bundles(&list);
        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].name, "Team");
        assert_eq!(bundles[0].color, "#ff6b6b");
        assert_eq!(bundles[0].addresses, vec![a, b]);
        assert_eq!(bundles[1].addresses, vec![b]);
    }
}
