//! Mapping abstract compute requirements onto catalog entries.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use topo_model::{Instance, MatchedInstance, Topology};
use topo_validate::fuzzy;

use crate::catalog::{Catalog, CatalogImage, SizeClass};

/// Number of catalog names offered when an image is not found.
const IMAGE_SUGGESTIONS: usize = 3;

/// Outcome of matching every instance of a topology.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchReport {
    pub ok: bool,
    /// Matches keyed by instance name.
    pub matches: BTreeMap<String, MatchedInstance>,
    pub messages: Vec<String>,
}

/// Pure catalog lookup for one backend.
pub struct ResourceMatcher<'a> {
    catalog: &'a Catalog,
}

impl<'a> ResourceMatcher<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Match every instance. Failures are collected per instance; one bad
    /// instance never hides another.
    pub fn match_topology(&self, topology: &Topology) -> MatchReport {
        let mut report = MatchReport {
            ok: true,
            ..Default::default()
        };

        for instance in &topology.instances {
            match self.match_instance(instance) {
                Ok(matched) => {
                    debug!(
                        "Matched {} -> image {} size {}",
                        instance.name, matched.image_id, matched.size_class
                    );
                    report.matches.insert(instance.name.clone(), matched);
                }
                Err(messages) => {
                    report.ok = false;
                    report.messages.extend(messages);
                }
            }
        }

        if report.ok {
            info!(
                "Matched {} instances against the {} catalog",
                report.matches.len(),
                self.catalog.backend
            );
        } else {
            warn!("{} matching problems", report.messages.len());
        }
        report
    }

    /// Match one instance, returning every problem found with it.
    pub fn match_instance(&self, instance: &Instance) -> Result<MatchedInstance, Vec<String>> {
        let image = self.find_image(&instance.image);
        let size = self.best_size(instance);

        match (image, size) {
            (Some(image), Some(size)) => Ok(MatchedInstance {
                instance_name: instance.name.clone(),
                image_id: image.id.clone(),
                size_class: size.name.clone(),
            }),
            (image, size) => {
                let mut messages = Vec::new();
                if image.is_none() {
                    messages.push(self.image_error(instance));
                }
                if size.is_none() {
                    messages.push(format!(
                        "Instance '{}': no {} size class offers at least {} vCPU and {} MiB RAM",
                        instance.name,
                        self.catalog.backend,
                        instance.cpu,
                        instance.ram_mib()
                    ));
                }
                Err(messages)
            }
        }
    }

    /// Case-normalized name match, or an exact image id.
    pub fn find_image(&self, requested: &str) -> Option<&'a CatalogImage> {
        let wanted = requested.trim().to_lowercase();
        self.catalog
            .images
            .iter()
            .find(|image| image.name.to_lowercase() == wanted)
            .or_else(|| self.catalog.images.iter().find(|image| image.id == requested))
    }

    /// Smallest class covering the vCPU and RAM requirement. Ties on
    /// (vCPU, RAM) go to the class whose disk is closest to the request.
    pub fn best_size(&self, instance: &Instance) -> Option<&'a SizeClass> {
        let ram_mib = instance.ram_mib();
        let disk = u64::from(instance.disk);
        self.catalog
            .sizes
            .iter()
            .filter(|size| size.vcpu >= instance.cpu && size.ram_mb >= ram_mib)
            .min_by_key(|size| {
                (
                    size.vcpu,
                    size.ram_mb,
                    u64::from(size.disk_gb).abs_diff(disk),
                    size.name.clone(),
                )
            })
    }

    fn image_error(&self, instance: &Instance) -> String {
        let closest = fuzzy::closest(&instance.image, self.catalog.image_names(), IMAGE_SUGGESTIONS);
        if closest.is_empty() {
            format!(
                "Instance '{}': image '{}' not found; the {} catalog has no images",
                instance.name, instance.image, self.catalog.backend
            )
        } else {
            format!(
                "Instance '{}': image '{}' not found in the {} catalog (closest: {})",
                instance.name,
                instance.image,
                self.catalog.backend,
                closest.join(", ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;

    fn catalog() -> Catalog {
        Catalog::new(Backend::OpenStack)
            .with_image("Ubuntu-22.04", "img-2204")
            .with_image("ubuntu-20.04", "img-2004")
            .with_image("debian-12", "img-deb12")
            .with_image("windows-2022", "img-win")
            .with_size(SizeClass::new("m1.large", 4, 8192, 80))
            .with_size(SizeClass::new("m1.small", 1, 2048, 20))
            .with_size(SizeClass::new("m1.medium-fat", 2, 4096, 80))
            .with_size(SizeClass::new("m1.medium", 2, 4096, 40))
    }

    #[test]
    fn test_image_match_is_case_normalized() {
        let catalog = catalog();
        let matcher = ResourceMatcher::new(&catalog);
        assert_eq!(matcher.find_image("ubuntu-22.04").unwrap().id, "img-2204");
        assert_eq!(matcher.find_image("img-deb12").unwrap().name, "debian-12");
        assert!(matcher.find_image("IMG-DEB12").is_none());
    }

    #[test]
    fn test_smallest_covering_size() {
        let catalog = catalog();
        let matcher = ResourceMatcher::new(&catalog);

        let small = Instance::new("a", "debian-12", 1, 1.0, 10);
        assert_eq!(matcher.best_size(&small).unwrap().name, "m1.small");

        // 2 GiB exactly fits m1.small; 2.5 GiB needs the next RAM step.
        let exact = Instance::new("b", "debian-12", 1, 2.0, 10);
        assert_eq!(matcher.best_size(&exact).unwrap().name, "m1.small");
        let over = Instance::new("c", "debian-12", 1, 2.5, 10);
        assert_eq!(matcher.best_size(&over).unwrap().name, "m1.medium");
    }

    #[test]
    fn test_disk_delta_breaks_ties() {
        let catalog = catalog();
        let matcher = ResourceMatcher::new(&catalog);

        let lean = Instance::new("a", "debian-12", 2, 4.0, 40);
        assert_eq!(matcher.best_size(&lean).unwrap().name, "m1.medium");
        let heavy = Instance::new("b", "debian-12", 2, 4.0, 100);
        assert_eq!(matcher.best_size(&heavy).unwrap().name, "m1.medium-fat");
    }

    #[test]
    fn test_unsatisfiable_size_is_an_error() {
        let catalog = catalog();
        let matcher = ResourceMatcher::new(&catalog);
        let huge = Instance::new("big", "debian-12", 16, 64.0, 10);

        let messages = matcher.match_instance(&huge).unwrap_err();
        assert_eq!(
            messages,
            vec!["Instance 'big': no openstack size class offers at least 16 vCPU and 65536 MiB RAM".to_string()]
        );
    }

    #[test]
    fn test_unknown_image_lists_closest() {
        let catalog = catalog();
        let matcher = ResourceMatcher::new(&catalog);
        let topology = Topology::new().with_instance(Instance::new("vm", "ubuntu-22.4", 1, 1.0, 10));

        let report = matcher.match_topology(&topology);
        assert!(!report.ok);
        assert!(report.matches.is_empty());
        assert_eq!(
            report.messages,
            vec!["Instance 'vm': image 'ubuntu-22.4' not found in the openstack catalog (closest: Ubuntu-22.04, ubuntu-20.04, debian-12)".to_string()]
        );
    }
}
