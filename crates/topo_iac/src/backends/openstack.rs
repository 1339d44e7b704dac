//! OpenStack: Neutron networks, subnets, routers and ports; Nova instances.

use crate::backend::{Backend, ProviderSettings};
use crate::driver::{self, BackendDriver, InstanceRequest, ModuleFiles, NetworkLayout};
use crate::error::IacResult;
use crate::hcl;

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenStackDriver;

impl BackendDriver for OpenStackDriver {
    fn backend(&self) -> Backend {
        Backend::OpenStack
    }

    fn render_provider(&self, _settings: &ProviderSettings) -> String {
        format!(
            r#"{terraform}
provider "openstack" {{
  auth_url    = var.auth_url
  region      = var.region
  tenant_name = var.tenant_name
  user_name   = var.user_name
  password    = var.password
}}
"#,
            terraform = driver::terraform_block(Backend::OpenStack)
        )
    }

    fn render_network(&self, layout: &NetworkLayout<'_>) -> IacResult<String> {
        Ok(format!(
            r#"module "network" {{
  source = "./modules/network"

  external_network_id = var.external_network_id

  networks = {networks}

  routers = {routers}
}}
"#,
            networks = hcl::network_list(&layout.topology.networks),
            routers = hcl::router_list(&layout.topology.routers, true),
        ))
    }

    fn render_instance(&self, request: &InstanceRequest<'_>) -> String {
        let instance = request.instance;
        let floating_address = instance.floating_ip.as_ref().and_then(|f| f.address());

        format!(
            r#"module "instance_{id}" {{
  source = "./modules/instance"

  name             = {name}
  image_id         = {image}
  size_class       = {size}
  keypair          = {keypair}
  security_groups  = {groups}
  interfaces       = {interfaces}
  floating_ip      = {floating}
  floating_address = {floating_address}
  user_data        = {user_data}
}}
"#,
            id = hcl::identifier(&instance.name),
            name = hcl::quote(&instance.name),
            image = hcl::quote(&request.matched.image_id),
            size = hcl::quote(&request.matched.size_class),
            keypair = hcl::quote_opt(instance.keypair.as_deref()),
            groups = hcl::string_list(instance.security_groups.iter().map(String::as_str)),
            interfaces = driver::interface_entries(instance, request.source, true),
            floating = instance.wants_floating_ip(),
            floating_address = hcl::quote_opt(floating_address),
            user_data = driver::user_data(request.boot_config),
        )
    }

    fn network_outputs(&self) -> &'static [&'static str] {
        &["network_ids", "subnet_ids", "router_ids"]
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

  interfaces = {
    for item in flatten([
      for r in var.routers : [
        for i in r.interfaces : { key = "${r.name}:${i.network}", router = r.name, network = i.network, ip = i.ip }
      ]
    ]) : item.key => item
  }

  routes = {
    for item in flatten([
      for r in var.routers : [
        for route in r.routes : { key = "${r.name}:${route.destination}", router = r.name, destination = route.destination, nexthop = route.nexthop }
      ]
    ]) : item.key => item
  }
}

resource "openstack_networking_network_v2" "this" {
  for_each = local.networks

  name           = each.key
  admin_state_up = true
}

resource "openstack_networking_subnet_v2" "this" {
  for_each = local.networks

  name        = each.key
  network_id  = openstack_networking_network_v2.this[each.key].id
  cidr        = each.value.cidr
  ip_version  = 4
  gateway_ip  = each.value.gateway_ip
  no_gateway  = each.value.gateway_ip == null
  enable_dhcp = each.value.enable_dhcp

  dynamic "allocation_pool" {
    for_each = each.value.pool
    content {
      start = allocation_pool.value.start
      end   = allocation_pool.value.end
    }
  }
}

resource "openstack_networking_router_v2" "this" {
  for_each = local.routers

  name                = each.key
  admin_state_up      = true
  external_network_id = each.value.external ? var.external_network_id : null
}

resource "openstack_networking_port_v2" "router" {
  for_each = local.interfaces

  name           = each.key
  network_id     = openstack_networking_network_v2.this[each.value.network].id
  admin_state_up = true

  fixed_ip {
    subnet_id  = openstack_networking_subnet_v2.this[each.value.network].id
    ip_address = each.value.ip
  }
}

resource "openstack_networking_router_interface_v2" "this" {
  for_each = local.interfaces

  router_id = openstack_networking_router_v2.this[each.value.router].id
  port_id   = openstack_networking_port_v2.router[each.key].id
}

resource "openstack_networking_router_route_v2" "this" {
  for_each   = local.routes
  depends_on = [openstack_networking_router_interface_v2.this]

  router_id        = openstack_networking_router_v2.this[each.value.router].id
  destination_cidr = each.value.destination
  next_hop         = each.value.nexthop
}
"#;

const NETWORK_VARIABLES: &str = r#"variable "external_network_id" {
  type    = string
  default = null
}

variable "networks" {
  type = any
}

variable "routers" {
  type = any
}
"#;

const NETWORK_OUTPUTS: &str = r#"output "network_ids" {
  value = { for name, network in openstack_networking_network_v2.this : name => network.id }
}

output "subnet_ids" {
  value = { for name, subnet in openstack_networking_subnet_v2.this : name => subnet.id }
}

output "router_ids" {
  value = { for name, router in openstack_networking_router_v2.this : name => router.id }
}
"#;

const INSTANCE_MAIN: &str = r#"data "openstack_networking_secgroup_v2" "this" {
  for_each = toset(var.security_groups)

  name = each.value
}

resource "openstack_networking_port_v2" "this" {
  count = length(var.interfaces)

  name               = "${var.name}-${count.index}"
  network_id         = var.interfaces[count.index].network_id
  admin_state_up     = true
  security_group_ids = [for group in data.openstack_networking_secgroup_v2.this : group.id]

  fixed_ip {
    subnet_id  = var.interfaces[count.index].subnet_id
    ip_address = var.interfaces[count.index].ip
  }
}

resource "openstack_compute_instance_v2" "this" {
  name        = var.name
  image_id    = var.image_id
  flavor_name = var.size_class
  key_pair    = var.keypair
  user_data   = var.user_data

  dynamic "network" {
    for_each = openstack_networking_port_v2.this
    content {
      port = network.value.id
    }
  }
}

resource "openstack_networking_floatingip_v2" "this" {
  count = var.floating_ip && var.floating_address == null ? 1 : 0

  pool = var.floating_pool
}

resource "openstack_networking_floatingip_associate_v2" "this" {
  count = var.floating_ip ? 1 : 0

  floating_ip = coalesce(var.floating_address, one(openstack_networking_floatingip_v2.this[*].address))
  port_id     = openstack_networking_port_v2.this[0].id
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

variable "keypair" {
  type    = string
  default = null
}

variable "security_groups" {
  type    = list(string)
  default = []
}

variable "interfaces" {
  type = list(object({
    network_id = string
    subnet_id  = string
    ip         = string
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

variable "floating_pool" {
  type    = string
  default = "public"
}

variable "user_data" {
  type    = string
  default = null
}
"#;

const INSTANCE_OUTPUTS: &str = r#"output "id" {
  value = openstack_compute_instance_v2.this.id
}

output "private_ip" {
  value = openstack_compute_instance_v2.this.access_ip_v4
}

output "public_ip" {
  value = one(openstack_networking_floatingip_associate_v2.this[*].floating_ip)
}
"#;
