//! AWS: one VPC per batch, a subnet per topology network, a route table
//! per router.

use topo_model::Topology;

use crate::backend::{Backend, ProviderSettings};
use crate::driver::{self, BackendDriver, InstanceRequest, ModuleFiles, NetworkLayout};
use crate::error::{IacError, IacResult};
use crate::hcl;

/// Security group name that maps onto the VPC default group.
const DEFAULT_SECURITY_GROUP: &str = "default";

#[derive(Debug, Default, Clone, Copy)]
pub struct AwsDriver;

impl BackendDriver for AwsDriver {
    fn backend(&self) -> Backend {
        Backend::Aws
    }

    fn render_provider(&self, _settings: &ProviderSettings) -> String {
        format!(
            r#"{terraform}
provider "aws" {{
  region = var.region

  default_tags {{
    tags = {{
      ManagedBy = "topoforge"
    }}
  }}
}}
"#,
            terraform = driver::terraform_block(Backend::Aws)
        )
    }

    fn unsupported(&self, topology: &Topology) -> Vec<String> {
        topology
            .routers
            .iter()
            .filter(|r| !r.routes.is_empty())
            .map(|r| {
                format!(
                    "Router '{}': {} static route(s) are not supported on aws and were skipped",
                    r.name,
                    r.routes.len()
                )
            })
            .collect()
    }

    fn render_network(&self, layout: &NetworkLayout<'_>) -> IacResult<String> {
        let plan = layout
            .plan
            .ok_or_else(|| IacError::Layout("the aws network module needs an address plan".to_string()))?;

        let public_subnet = plan.public_subnet.map(|p| p.to_string());
        let bastion = match (layout.bastion, &public_subnet) {
            (Some(matched), Some(_)) => format!(
                "{{ image_id = {}, size_class = {} }}",
                hcl::quote(&matched.image_id),
                hcl::quote(&matched.size_class)
            ),
            _ => "null".to_string(),
        };

        Ok(format!(
            r#"module "network" {{
  source = "./modules/network"

  name_prefix        = {prefix}
  vpc_cidr           = {vpc}
  public_subnet_cidr = {public}
  bastion            = {bastion}

  networks = {networks}

  routers = {routers}
}}
"#,
            prefix = hcl::quote(layout.name),
            vpc = hcl::quote(&plan.vpc_cidr.to_string()),
            public = hcl::quote_opt(public_subnet.as_deref()),
            bastion = bastion,
            networks = hcl::network_list(&layout.topology.networks),
            routers = hcl::router_list(&layout.topology.routers, false),
        ))
    }

    fn render_instance(&self, request: &InstanceRequest<'_>) -> String {
        let instance = request.instance;
        let source = request.source.expression();
        let default_group = if instance.security_groups.contains(DEFAULT_SECURITY_GROUP) {
            format!("[{}.default_security_group_id]", source)
        } else {
            "[]".to_string()
        };
        let named_groups = hcl::string_list(
            instance
                .security_groups
                .iter()
                .map(String::as_str)
                .filter(|g| *g != DEFAULT_SECURITY_GROUP),
        );
        let floating_address = instance.floating_ip.as_ref().and_then(|f| f.address());

        format!(
            r#"module "instance_{id}" {{
  source = "./modules/instance"

  name                       = {name}
  image_id                   = {image}
  size_class                 = {size}
  disk_gb                    = {disk}
  keypair                    = {keypair}
  vpc_id                     = {source}.vpc_id
  default_security_group_ids = {default_group}
  security_group_names       = {named_groups}
  interfaces                 = {interfaces}
  floating_ip                = {floating}
  floating_address           = {floating_address}
  user_data                  = {user_data}
}}
"#,
            id = hcl::identifier(&instance.name),
            name = hcl::quote(&instance.name),
            image = hcl::quote(&request.matched.image_id),
            size = hcl::quote(&request.matched.size_class),
            disk = instance.disk,
            keypair = hcl::quote_opt(instance.keypair.as_deref()),
            interfaces = driver::interface_entries(instance, request.source, false),
            floating = instance.wants_floating_ip(),
            floating_address = hcl::quote_opt(floating_address),
            user_data = driver::user_data(request.boot_config),
        )
    }

    fn network_outputs(&self) -> &'static [&'static str] {
        &[
            "vpc_id",
            "network_ids",
            "subnet_ids",
            "default_security_group_id",
            "bastion_public_ip",
        ]
    }

    fn network_module(&self) -> ModuleFiles {
        ModuleFiles {
            main: NETWORK_MAIN,
            variables: NETWORK_VARIABLES,
            outputs: NETWORK_OUTPUTS,
        }
    }

    fn instance_module(&self) -> ModuleFiles {
        ModuleFiles {
            main: INSTANCE_MAIN,
            variables: INSTANCE_VARIABLES,
            outputs: INSTANCE_OUTPUTS,
        }
    }
}

const NETWORK_MAIN: &str = r#"locals {
  networks = { for n in var.networks : n.name => n }
  routers  = { for r in var.routers : r.name => r }

  # A subnet is associated with the first router attached to it.
  network_router = {
    for n in var.networks : n.name => try(
      [for r in var.routers : r.name if contains([for i in r.interfaces : i.network], n.name)][0],
      null
    )
  }
}

resource "aws_vpc" "this" {
  cidr_block           = var.vpc_cidr
  enable_dns_support   = true
  enable_dns_hostnames = true

  tags = {
    Name = var.name_prefix
  }
}

resource "aws_internet_gateway" "this" {
  vpc_id = aws_vpc.this.id

  tags = {
    Name = "${var.name_prefix}-igw"
  }
}

resource "aws_subnet" "public" {
  count = var.public_subnet_cidr == null ? 0 : 1

  vpc_id                  = aws_vpc.this.id
  cidr_block              = var.public_subnet_cidr
  map_public_ip_on_launch = true

  tags = {
    Name = "${var.name_prefix}-public"
  }
}

resource "aws_route_table" "public" {
  count  = var.public_subnet_cidr == null ? 0 : 1
  vpc_id = aws_vpc.this.id

  route {
    cidr_block = "0.0.0.0/0"
    gateway_id = aws_internet_gateway.this.id
  }
}

resource "aws_route_table_association" "public" {
  count          = var.public_subnet_cidr == null ? 0 : 1
  subnet_id      = aws_subnet.public[0].id
  route_table_id = aws_route_table.public[0].id
}

resource "aws_subnet" "this" {
  for_each = local.networks

  vpc_id     = aws_vpc.this.id
  cidr_block = each.value.cidr

  tags = {
    Name = each.key
  }
}

resource "aws_route_table" "this" {
  for_each = local.routers
  vpc_id   = aws_vpc.this.id

  dynamic "route" {
    for_each = each.value.external ? [1] : []
    content {
      cidr_block = "0.0.0.0/0"
      gateway_id = aws_internet_gateway.this.id
    }
  }

  tags = {
    Name = each.key
  }
}

resource "aws_route_table_association" "this" {
  for_each = { for network, router in local.network_router : network => router if router != null }

  subnet_id      = aws_subnet.this[each.key].id
  route_table_id = aws_route_table.this[each.value].id
}

resource "aws_instance" "bastion" {
  count = var.bastion == null || var.public_subnet_cidr == null ? 0 : 1

  ami                         = var.bastion.image_id
  instance_type               = var.bastion.size_class
  subnet_id                   = aws_subnet.public[0].id
  associate_public_ip_address = true

  tags = {
    Name = "${var.name_prefix}-bastion"
  }
}
"#;

const NETWORK_VARIABLES: &str = r#"variable "name_prefix" {
  type = string
}

variable "vpc_cidr" {
  type = string
}

variable "public_subnet_cidr" {
  type    = string
  default = null
}

variable "bastion" {
  type    = any
  default = null
}

variable "networks" {
  type = any
}

variable "routers" {
  type = any
}
"#;

const NETWORK_OUTPUTS: &str = r#"output "vpc_id" {
  value = aws_vpc.this.id
}

output "network_ids" {
  value = { for name, subnet in aws_subnet.this : name => subnet.vpc_id }
}

output "subnet_ids" {
  value = { for name, subnet in aws_subnet.this : name => subnet.id }
}

output "default_security_group_id" {
  value = aws_vpc.this.default_security_group_id
}

output "bastion_public_ip" {
  value = one(aws_instance.bastion[*].public_ip)
}
"#;

const INSTANCE_MAIN: &str = r#"data "aws_security_group" "named" {
  for_each = toset(var.security_group_names)

  vpc_id = var.vpc_id
  name   = each.value
}

locals {
  security_group_ids = concat(
    var.default_security_group_ids,
    [for group in data.aws_security_group.named : group.id]
  )
}

resource "aws_instance" "this" {
  ami                    = var.image_id
  instance_type          = var.size_class
  key_name               = var.keypair
  subnet_id              = var.interfaces[0].subnet_id
  private_ip             = var.interfaces[0].ip
  vpc_security_group_ids = length(local.security_group_ids) > 0 ? local.security_group_ids : null
  user_data              = var.user_data

  root_block_device {
    volume_size = var.disk_gb
  }

  tags = {
    Name = var.name
  }
}

resource "aws_network_interface" "extra" {
  count = length(var.interfaces) - 1

  subnet_id       = var.interfaces[count.index + 1].subnet_id
  private_ips     = [var.interfaces[count.index + 1].ip]
  security_groups = local.security_group_ids

  attachment {
    instance     = aws_instance.this.id
    device_index = count.index + 1
  }
}

resource "aws_eip" "this" {
  count = var.floating_ip && var.floating_address == null ? 1 : 0

  instance = aws_instance.this.id
  domain   = "vpc"
}

resource "aws_eip_association" "this" {
  count = var.floating_address == null ? 0 : 1

  instance_id = aws_instance.this.id
  public_ip   = var.floating_address
}
"#;

const INSTANCE_VARIABLES: &str = r#"variable "name" {
  type = string
}

variable "image_id" {
  type = string
}

variable "size_class" {
  type = string
}

variable "disk_gb" {
  type = number
}

variable "keypair" {
  type    = string
  default = null
}

variable "vpc_id" {
  type = string
}

variable "default_security_group_ids" {
  type    = list(string)
  default = []
}

variable "security_group_names" {
  type    = list(string)
  default = []
}

variable "interfaces" {
  type = list(object({
    subnet_id = string
    ip        = string
  }))
}

variable "floating_ip" {
  type    = bool
  default = false
}

variable "floating_address" {
  type    = string
  default = null
}

variable "user_data" {
  type    = string
  default = null
}
"#;

const INSTANCE_OUTPUTS: &str = r#"output "id" {
  value = aws_instance.this.id
}

output "private_ip" {
  value = aws_instance.this.private_ip
}

output "public_ip" {
  value = var.floating_address != null ? var.floating_address : one(aws_eip.this[*].public_ip)
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone::{CloneEngine, CounterTokens};
    use crate::driver::NetworkSource;
    use topo_model::{FloatingIp, Instance, MatchedInstance, Network, Router};

    fn topology() -> Topology {
        Topology::new()
            .with_network(Network::new("web-net", "192.168.10.0/24").with_gateway("192.168.10.1"))
            .with_instance(
                Instance::new("web-1", "ubuntu-22.04", 1, 1.0, 10)
                    .attach("web-net", "192.168.10.10")
                    .with_security_group("default")
                    .with_security_group("web")
                    .with_floating_ip(FloatingIp::Address("54.0.0.9".to_string())),
            )
            .with_router(
                Router::new("edge", true)
                    .attach("web-net", "192.168.10.1")
                    .route("172.16.0.0/16", "192.168.10.254"),
            )
    }

    fn matched() -> MatchedInstance {
        MatchedInstance {
            instance_name: "web-1".to_string(),
            image_id: "ami-1".to_string(),
            size_class: "t2.micro".to_string(),
        }
    }

    #[test]
    fn test_network_requires_plan() {
        let topology = topology();
        let layout = NetworkLayout {
            name: "aws",
            topology: &topology,
            plan: None,
            bastion: None,
        };
        assert!(matches!(AwsDriver.render_network(&layout), Err(IacError::Layout(_))));
    }

    #[test]
    fn test_network_drops_routes() {
        let topology = topology();
        let set = CloneEngine::new(CounterTokens::default())
            .clone_shared(&topology, 1)
            .unwrap();
        let matched = matched();
        let layout = NetworkLayout {
            name: "aws",
            topology: &topology,
            plan: set.plan.as_ref(),
            bastion: Some(&matched),
        };

        let block = AwsDriver.render_network(&layout).unwrap();
        assert!(block.contains("vpc_cidr           = \"192.168.10.0/23\""));
        assert!(block.contains("public_subnet_cidr = \"192.168.11.0/24\""));
        assert!(block.contains("image_id = \"ami-1\""));
        assert!(!block.contains("172.16.0.0/16"));
        assert_eq!(AwsDriver.unsupported(&topology).len(), 1);
    }

    #[test]
    fn test_instance_security_groups() {
        let topology = topology();
        let matched = matched();
        let source = NetworkSource::shared_network();
        let block = AwsDriver.render_instance(&InstanceRequest {
            instance: &topology.instances[0],
            matched: &matched,
            boot_config: None,
            source: &source,
        });

        assert!(block.starts_with("module \"instance_web_1\" {"));
        assert!(block.contains(
            "default_security_group_ids = [data.terraform_remote_state.network.outputs.default_security_group_id]"
        ));
        assert!(block.contains("security_group_names       = [\"web\"]"));
        assert!(block.contains("floating_address           = \"54.0.0.9\""));
        assert!(block.contains("subnet_ids[\"web-net\"]"));
    }
}
