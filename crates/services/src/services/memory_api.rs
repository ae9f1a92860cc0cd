//! In-process back office used by tests and by the server when no remote API
//! is configured.
//!
//! Ids are allocated as integers and emitted as JSON numbers, the way the
//! legacy REST backend does, so the numeric-id path of [`EntityId`] stays
//! exercised.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use domain::models::{
    EntityId,
    client::{Client, ClientStatus, CreateClient, RemoteAccess, RemoteAccessKind, UpdateClient},
    company::{BillingInfo, Company},
    incident::{CreateIncident, Incident, IncidentPriority, IncidentStatus, UpdateIncident},
    technician::{Availability, Technician, UpdateTechnician},
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    api::{ApiError, BackOfficeApi, PageQuery},
    projection::{Filter, IncidentFilters},
};

const ID_FIELDS: [&str; 4] = ["id", "clientId", "technicianId", "companyId"];

/// How list endpoints wrap their items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadShape {
    /// `{ "content": [...], "totalElements": n }`
    #[default]
    Envelope,
    /// `[...]`
    BareArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListIncidents,
    ListTechnicians,
    ListClients,
    ListCompanies,
    CreateIncident,
    UpdateIncident,
    DeleteIncident,
    UpdateTechnician,
    CreateClient,
    UpdateClient,
    DeleteClient,
}

#[derive(Debug, Default)]
struct Tables {
    incidents: Vec<Incident>,
    technicians: Vec<Technician>,
    clients: Vec<Client>,
    companies: Vec<Company>,
    last_id: i64,
}

impl Tables {
    fn allocate_id(&mut self) -> EntityId {
        self.last_id += 1;
        EntityId::from(self.last_id)
    }
}

#[derive(Debug, Default)]
struct Faults {
    failures: HashMap<Operation, VecDeque<ApiError>>,
    raw_payloads: HashMap<Operation, VecDeque<Value>>,
    calls: HashMap<Operation, usize>,
}

#[derive(Debug, Default)]
pub struct InMemoryBackOfficeApi {
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
    shape: PayloadShape,
}

impl InMemoryBackOfficeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shape(mut self, shape: PayloadShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_incidents(self, incidents: Vec<Incident>) -> Self {
        self.seed(|t| t.incidents = incidents);
        self
    }

    pub fn with_technicians(self, technicians: Vec<Technician>) -> Self {
        self.seed(|t| t.technicians = technicians);
        self
    }

    pub fn with_clients(self, clients: Vec<Client>) -> Self {
        self.seed(|t| t.clients = clients);
        self
    }

    pub fn with_companies(self, companies: Vec<Company>) -> Self {
        self.seed(|t| t.companies = companies);
        self
    }

    fn seed(&self, f: impl FnOnce(&mut Tables)) {
        let mut tables = self.tables.lock();
        f(&mut tables);
        let highest = tables
            .incidents
            .iter()
            .map(|i| &i.id)
            .chain(tables.technicians.iter().map(|t| &t.id))
            .chain(tables.clients.iter().map(|c| &c.id))
            .chain(tables.companies.iter().map(|c| &c.id))
            .filter_map(|id| id.as_str().parse::<i64>().ok())
            .max()
            .unwrap_or(0);
        tables.last_id = tables.last_id.max(highest);
    }

    /// Make the next call to `operation` fail with `error`. Queued errors are
    /// consumed one per call.
    pub fn fail_next(&self, operation: Operation, error: ApiError) {
        self.faults
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Make the next list call for `operation` answer `payload` verbatim.
    pub fn respond_raw(&self, operation: Operation, payload: Value) {
        self.faults
            .lock()
            .raw_payloads
            .entry(operation)
            .or_default()
            .push_back(payload);
    }

    pub fn calls(&self, operation: Operation) -> usize {
        self.faults.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    pub fn incidents(&self) -> Vec<Incident> {
        self.tables.lock().incidents.clone()
    }

    pub fn technicians(&self) -> Vec<Technician> {
        self.tables.lock().technicians.clone()
    }

    pub fn clients(&self) -> Vec<Client> {
        self.tables.lock().clients.clone()
    }

    fn enter(&self, operation: Operation) -> Result<Option<Value>, ApiError> {
        let mut faults = self.faults.lock();
        *faults.calls.entry(operation).or_default() += 1;
        if let Some(error) = faults
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            debug!(?operation, %error, "Injected back-office failure");
            return Err(error);
        }
        Ok(faults
            .raw_payloads
            .get_mut(&operation)
            .and_then(VecDeque::pop_front))
    }

    fn list_payload<T: Serialize>(&self, items: &[T], page: Option<PageQuery>) -> Result<Value, ApiError> {
        let total = items.len();
        let window: &[T] = match page {
            Some(page) => {
                let size = page.size.max(1) as usize;
                let start = (page.page as usize).saturating_mul(size).min(total);
                let end = start.saturating_add(size).min(total);
                &items[start..end]
            }
            None => items,
        };

        let mut content = Vec::with_capacity(window.len());
        for item in window {
            let mut value = serde_json::to_value(item).map_err(|e| ApiError::Serde(e.to_string()))?;
            numeric_ids(&mut value);
            content.push(value);
        }

        Ok(match self.shape {
            PayloadShape::BareArray => Value::Array(content),
            PayloadShape::Envelope => json!({
                "content": content,
                "totalElements": total,
                "page": page.map(|p| p.page).unwrap_or(0),
                "size": page.map(|p| p.size as usize).unwrap_or(total),
            }),
        })
    }

    /// A small, plausible data set for running the server without a backend.
    pub fn seeded() -> Self {
        let now = Utc::now();
        let company = Company {
            id: EntityId::from(1),
            name: "FroidService Atlantique".to_string(),
            contract_start: NaiveDate::from_ymd_opt(2024, 1, 1),
            contract_end: NaiveDate::from_ymd_opt(2026, 12, 31),
            billing: BillingInfo {
                billing_address: Some("12 quai de la Fosse, 44000 Nantes".to_string()),
                vat_number: Some("FR40123456789".to_string()),
                billing_email: Some("facturation@froidservice.fr".to_string()),
            },
            operating_hours: Some("Lun-Ven 7h-19h, astreinte week-end".to_string()),
        };

        let clients = vec![
            Client {
                id: EntityId::from(10),
                company_id: company.id.clone(),
                name: "Boulangerie Martin".to_string(),
                address: Some("3 rue du Calvaire, Nantes".to_string()),
                contact_name: Some("Sophie Martin".to_string()),
                phone: Some("02 40 11 22 33".to_string()),
                email: Some("contact@boulangerie-martin.fr".to_string()),
                status: ClientStatus::Active,
                remote_accesses: vec![RemoteAccess {
                    kind: RemoteAccessKind::Teamviewer,
                    identifier: "482 913 077".to_string(),
                    password: None,
                    url: None,
                    label: Some("PC caisse".to_string()),
                }],
            },
            Client {
                id: EntityId::from(11),
                company_id: company.id.clone(),
                name: "Supermarché Les Halles".to_string(),
                address: Some("Place du Commerce, Saint-Nazaire".to_string()),
                contact_name: Some("Marc Leroy".to_string()),
                phone: Some("02 40 44 55 66".to_string()),
                email: None,
                status: ClientStatus::Active,
                remote_accesses: vec![
                    RemoteAccess {
                        kind: RemoteAccessKind::Anydesk,
                        identifier: "1 234 567 890".to_string(),
                        password: None,
                        url: None,
                        label: Some("Supervision froid".to_string()),
                    },
                    RemoteAccess {
                        kind: RemoteAccessKind::Vnc,
                        identifier: "10.0.4.12:5900".to_string(),
                        password: None,
                        url: None,
                        label: Some("Automate chambre froide".to_string()),
                    },
                ],
            },
            Client {
                id: EntityId::from(12),
                company_id: company.id.clone(),
                name: "Restaurant Le Quai".to_string(),
                address: Some("8 quai Turenne, Nantes".to_string()),
                contact_name: None,
                phone: Some("02 40 77 88 99".to_string()),
                email: None,
                status: ClientStatus::Inactive,
                remote_accesses: Vec::new(),
            },
        ];

        let technician = |id: i64, name: &str, specialization: &str, availability| Technician {
            id: EntityId::from(id),
            company_id: Some(company.id.clone()),
            name: name.to_string(),
            phone: None,
            email: None,
            specialization: Some(specialization.to_string()),
            availability,
        };
        let technicians = vec![
            technician(20, "Karim Benali", "Froid commercial", Availability::Available),
            technician(21, "Léa Morvan", "Climatisation", Availability::Busy),
            technician(22, "Yann Le Goff", "Chambres froides", Availability::Available),
            technician(23, "Claire Dubois", "Pompes à chaleur", Availability::Offline),
        ];

        let incident = |id: i64,
                        client: i64,
                        caller: &str,
                        description: &str,
                        priority,
                        status,
                        technician: Option<i64>,
                        hours_ago: i64| Incident {
            id: EntityId::from(id),
            client_id: EntityId::from(client),
            caller: caller.to_string(),
            description: description.to_string(),
            equipment: None,
            priority,
            status,
            technician_id: technician.map(EntityId::from),
            notes: None,
            created_by: Some("operator".to_string()),
            created_at: now - Duration::hours(hours_ago),
        };
        let incidents = vec![
            incident(30, 10, "Sophie Martin", "Vitrine réfrigérée à 12°C", IncidentPriority::High, IncidentStatus::Open, None, 1),
            incident(31, 11, "Marc Leroy", "Alarme haute pression chambre froide négative", IncidentPriority::Urgent, IncidentStatus::InProgress, Some(21), 3),
            incident(32, 11, "Accueil", "Bruit anormal compresseur rayon frais", IncidentPriority::Medium, IncidentStatus::Assigned, Some(21), 20),
            incident(33, 12, "Chef de cuisine", "Givre sur évaporateur", IncidentPriority::Low, IncidentStatus::Resolved, None, 48),
            incident(34, 10, "Sophie Martin", "Contrôle d'étanchéité annuel", IncidentPriority::Low, IncidentStatus::Closed, None, 240),
        ];

        Self::new()
            .with_companies(vec![company])
            .with_clients(clients)
            .with_technicians(technicians)
            .with_incidents(incidents)
    }
}

/// Rewrite id fields holding integer strings as JSON numbers.
fn numeric_ids(value: &mut Value) {
    let Value::Object(map) = value else {
        return;
    };
    for field in ID_FIELDS {
        let Some(slot) = map.get_mut(field) else {
            continue;
        };
        let number = slot.as_str().and_then(|s| s.parse::<i64>().ok());
        if let Some(number) = number {
            *slot = Value::from(number);
        }
    }
}

fn not_found(kind: &str, id: &EntityId) -> ApiError {
    ApiError::NotFound(format!("{kind} {id}"))
}

fn bad_request(message: impl ToString) -> ApiError {
    ApiError::Http {
        status: 400,
        body: message.to_string(),
    }
}

#[async_trait]
impl BackOfficeApi for InMemoryBackOfficeApi {
    async fn list_incidents(
        &self,
        page: PageQuery,
        filters: Option<&IncidentFilters>,
    ) -> Result<Value, ApiError> {
        if let Some(raw) = self.enter(Operation::ListIncidents)? {
            return Ok(raw);
        }
        let mut incidents: Vec<Incident> = self
            .tables
            .lock()
            .incidents
            .iter()
            .filter(|i| filters.is_none_or(|f| f.matches(i)))
            .cloned()
            .collect();
        incidents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.list_payload(&incidents, Some(page))
    }

    async fn list_technicians(&self) -> Result<Value, ApiError> {
        if let Some(raw) = self.enter(Operation::ListTechnicians)? {
            return Ok(raw);
        }
        let technicians = self.tables.lock().technicians.clone();
        self.list_payload(&technicians, None)
    }

    async fn list_clients(
        &self,
        company_id: Option<&EntityId>,
        page: PageQuery,
    ) -> Result<Value, ApiError> {
        if let Some(raw) = self.enter(Operation::ListClients)? {
            return Ok(raw);
        }
        let clients: Vec<Client> = self
            .tables
            .lock()
            .clients
            .iter()
            .filter(|c| company_id.is_none_or(|id| &c.company_id == id))
            .cloned()
            .collect();
        self.list_payload(&clients, Some(page))
    }

    async fn list_companies(&self) -> Result<Value, ApiError> {
        if let Some(raw) = self.enter(Operation::ListCompanies)? {
            return Ok(raw);
        }
        let companies = self.tables.lock().companies.clone();
        self.list_payload(&companies, None)
    }

    async fn create_incident(&self, data: &CreateIncident) -> Result<Incident, ApiError> {
        self.enter(Operation::CreateIncident)?;
        data.validate().map_err(bad_request)?;

        let mut tables = self.tables.lock();
        if !tables.clients.is_empty() && !tables.clients.iter().any(|c| c.id == data.client_id) {
            return Err(not_found("client", &data.client_id));
        }
        let mut incident = Incident::pending(data, data.created_by.clone());
        incident.id = tables.allocate_id();
        tables.incidents.push(incident.clone());
        Ok(incident)
    }

    async fn update_incident(
        &self,
        id: &EntityId,
        patch: &UpdateIncident,
    ) -> Result<Incident, ApiError> {
        self.enter(Operation::UpdateIncident)?;
        let mut tables = self.tables.lock();
        let incident = tables
            .incidents
            .iter_mut()
            .find(|i| &i.id == id)
            .ok_or_else(|| not_found("incident", id))?;
        incident.apply_patch(patch);
        Ok(incident.clone())
    }

    async fn delete_incident(&self, id: &EntityId) -> Result<(), ApiError> {
        self.enter(Operation::DeleteIncident)?;
        let mut tables = self.tables.lock();
        let index = tables
            .incidents
            .iter()
            .position(|i| &i.id == id)
            .ok_or_else(|| not_found("incident", id))?;
        tables.incidents.remove(index);
        Ok(())
    }

    async fn update_technician(
        &self,
        id: &EntityId,
        patch: &UpdateTechnician,
    ) -> Result<Technician, ApiError> {
        self.enter(Operation::UpdateTechnician)?;
        let mut tables = self.tables.lock();
        let technician = tables
            .technicians
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| not_found("technician", id))?;
        technician.apply_patch(patch);
        Ok(technician.clone())
    }

    async fn create_client(&self, data: &CreateClient) -> Result<Client, ApiError> {
        self.enter(Operation::CreateClient)?;
        data.validate().map_err(bad_request)?;
        let mut tables = self.tables.lock();
        let id = tables.allocate_id();
        let client = Client::from_create(id, data);
        tables.clients.push(client.clone());
        Ok(client)
    }

    async fn update_client(&self, id: &EntityId, patch: &UpdateClient) -> Result<Client, ApiError> {
        self.enter(Operation::UpdateClient)?;
        patch.validate().map_err(bad_request)?;
        let mut tables = self.tables.lock();
        let client = tables
            .clients
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| not_found("client", id))?;
        client.apply_patch(patch);
        Ok(client.clone())
    }

    async fn delete_client(&self, id: &EntityId) -> Result<(), ApiError> {
        self.enter(Operation::DeleteClient)?;
        let mut tables = self.tables.lock();
        let index = tables
            .clients
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| not_found("client", id))?;
        tables.clients.remove(index);
        Ok(())
    }
}
