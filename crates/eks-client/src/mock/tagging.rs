//! Resource Groups Tagging operations for MockEksClient

use super::{MockEksClient, lock};
use crate::error::EksError;
use crate::models::*;

fn matches(tags: &TagMap, filters: &[TagFilter]) -> bool {
    filters.iter().all(|f| match tags.get(&f.key) {
        Some(v) => f.values.is_empty() || f.values.contains(v),
        None => false,
    })
}

pub fn get_resources_by_tag(client: &MockEksClient, filters: &[TagFilter]) -> Result<Vec<TaggedResource>, EksError> {
    client.record("get_resources_by_tag", "")?;

    let mut resources: Vec<TaggedResource> = Vec::new();
    resources.extend(lock(&client.clusters).values().filter_map(|c| {
        let arn = c.arn.clone()?;
        matches(&c.tags, filters).then(|| TaggedResource { resource_arn: arn, tags: c.tags.clone() })
    }));
    resources.extend(
        lock(&client.load_balancers)
            .values()
            .filter(|l| matches(&l.tags, filters))
            .map(|l| TaggedResource { resource_arn: l.arn.clone(), tags: l.tags.clone() }),
    );
    resources.extend(
        lock(&client.target_groups)
            .iter()
            .filter(|(_, tags)| matches(tags, filters))
            .map(|(arn, tags)| TaggedResource { resource_arn: arn.clone(), tags: tags.clone() }),
    );
    let security_groups: Vec<(String, TagMap)> = lock(&client.security_groups)
        .iter()
        .filter(|(_, tags)| matches(tags, filters))
        .map(|(id, tags)| (id.clone(), tags.clone()))
        .collect();
    resources.extend(security_groups.into_iter().map(|(id, tags)| TaggedResource {
        resource_arn: client.security_group_arn(&id),
        tags,
    }));

    resources.sort_by(|a, b| a.resource_arn.cmp(&b.resource_arn));
    Ok(resources)
}
