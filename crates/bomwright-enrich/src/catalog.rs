//! Canonical cloud service names.
//!
//! Completion replies name the same service many ways ("web app",
//! "Azure App Service", "App Services"). Items are normalized to the names
//! used by the retail pricing catalog before they are merged, so that
//! variations collapse onto a single artifact line.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Names exactly as they appear in the pricing catalog.
const CANONICAL_NAMES: &[&str] = &[
    // Compute
    "Virtual Machines",
    "App Service",
    "Azure Functions",
    "Container Instances",
    "Azure Kubernetes Service",
    "Azure Batch",
    // Databases
    "SQL Database",
    "Azure Cosmos DB",
    "Azure Database for MySQL",
    "Azure Database for PostgreSQL",
    "Azure Database for MariaDB",
    "Azure Cache for Redis",
    // Storage
    "Storage",
    "Azure Files",
    // Networking
    "Application Gateway",
    "Load Balancer",
    "VPN Gateway",
    "ExpressRoute",
    "Virtual Network",
    "Azure CDN",
    "Azure Traffic Manager",
    "Azure Front Door",
    // Analytics
    "Azure Synapse Analytics",
    "Azure Databricks",
    "HDInsight",
    "Data Factory",
    "Stream Analytics",
    // AI
    "Azure Machine Learning",
    "Cognitive Services",
    "Azure OpenAI",
    // Integration
    "Service Bus",
    "Event Hubs",
    "Event Grid",
    "API Management",
    "Logic Apps",
    // Monitoring
    "Azure Monitor",
    "Log Analytics",
    "Application Insights",
    "Automation",
    // Security
    "Key Vault",
    "Azure Active Directory",
];

/// Lowercased variation -> canonical name.
const VARIATIONS: &[(&str, &str)] = &[
    ("vm", "Virtual Machines"),
    ("vms", "Virtual Machines"),
    ("virtual machine", "Virtual Machines"),
    ("azure virtual machines", "Virtual Machines"),
    ("compute", "Virtual Machines"),
    ("web app", "App Service"),
    ("web apps", "App Service"),
    ("webapp", "App Service"),
    ("webapps", "App Service"),
    ("azure app service", "App Service"),
    ("app services", "App Service"),
    ("azure web apps", "App Service"),
    ("function", "Azure Functions"),
    ("functions", "Azure Functions"),
    ("function app", "Azure Functions"),
    ("serverless", "Azure Functions"),
    ("aks", "Azure Kubernetes Service"),
    ("kubernetes", "Azure Kubernetes Service"),
    ("sql", "SQL Database"),
    ("azure sql", "SQL Database"),
    ("azure sql database", "SQL Database"),
    ("sql db", "SQL Database"),
    ("database", "SQL Database"),
    ("cosmosdb", "Azure Cosmos DB"),
    ("cosmos", "Azure Cosmos DB"),
    ("cosmos db", "Azure Cosmos DB"),
    ("document db", "Azure Cosmos DB"),
    ("mysql", "Azure Database for MySQL"),
    ("azure mysql", "Azure Database for MySQL"),
    ("postgres", "Azure Database for PostgreSQL"),
    ("postgresql", "Azure Database for PostgreSQL"),
    ("azure postgres", "Azure Database for PostgreSQL"),
    ("azure postgresql", "Azure Database for PostgreSQL"),
    ("redis", "Azure Cache for Redis"),
    ("cache", "Azure Cache for Redis"),
    ("azure redis", "Azure Cache for Redis"),
    ("blob", "Storage"),
    ("blobs", "Storage"),
    ("blob storage", "Storage"),
    ("azure storage", "Storage"),
    ("storage account", "Storage"),
    ("storage accounts", "Storage"),
    ("object storage", "Storage"),
    ("apim", "API Management"),
    ("api gateway", "API Management"),
    ("app gateway", "Application Gateway"),
    ("appgw", "Application Gateway"),
    ("content delivery network", "Azure CDN"),
    ("cdn", "Azure CDN"),
    ("front door", "Azure Front Door"),
    ("monitoring", "Azure Monitor"),
    ("logs", "Log Analytics"),
    ("log", "Log Analytics"),
    ("insights", "Application Insights"),
    ("app insights", "Application Insights"),
];

static CANONICAL_BY_LOWER: LazyLock<HashMap<String, &'static str>> = LazyLock::new(|| {
    CANONICAL_NAMES
        .iter()
        .map(|name| (name.to_lowercase(), *name))
        .collect()
});

static VARIATION_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| VARIATIONS.iter().copied().collect());

/// Map a service name onto its canonical catalog name.
///
/// Lookup is case-insensitive and ignores surrounding whitespace. A leading
/// "Azure " is tried both with and without the prefix. Names that match
/// nothing are returned trimmed but otherwise unchanged.
pub fn normalize_service_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let lower = trimmed.to_lowercase();

    if let Some(found) = lookup(&lower) {
        return found.to_string();
    }
    if let Some(rest) = lower.strip_prefix("azure ") {
        if let Some(found) = lookup(rest.trim()) {
            return found.to_string();
        }
    }
    trimmed.to_string()
}

fn lookup(lower: &str) -> Option<&'static str> {
    CANONICAL_BY_LOWER
        .get(lower)
        .copied()
        .or_else(|| VARIATION_MAP.get(lower).copied())
}

/// Derive the ARM region identifier from a display region name.
///
/// "East US 2" becomes "eastus2".
pub fn arm_region_name(region: &str) -> String {
    region
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Guidance text listing the names the pricing catalog expects.
pub fn service_name_hints() -> String {
    let groups: [(&str, &[&str]); 5] = [
        (
            "Compute",
            &["Virtual Machines", "App Service", "Azure Functions", "Azure Kubernetes Service"],
        ),
        (
            "Database",
            &[
                "SQL Database",
                "Azure Cosmos DB",
                "Azure Database for MySQL",
                "Azure Database for PostgreSQL",
                "Azure Cache for Redis",
            ],
        ),
        ("Storage", &["Storage"]),
        (
            "Networking",
            &["Application Gateway", "Load Balancer", "VPN Gateway", "Virtual Network"],
        ),
        (
            "AI/ML",
            &["Azure Machine Learning", "Cognitive Services", "Azure OpenAI"],
        ),
    ];

    let mut out = String::from("Use these exact service names in BOM items:\n");
    for (group, names) in groups {
        out.push_str(group);
        out.push_str(":\n");
        for name in names {
            let aliases: Vec<&str> = VARIATIONS
                .iter()
                .filter(|(_, canonical)| canonical == name)
                .map(|(alias, _)| *alias)
                .take(3)
                .collect();
            if aliases.is_empty() {
                out.push_str(&format!("  - {name}\n"));
            } else {
                out.push_str(&format!("  - {name} (not: {})\n", aliases.join(", ")));
            }
        }
    }
    out
}
