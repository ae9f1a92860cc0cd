//! User actions against the back office.
//!
//! Every action follows the same policy: validate against the current board,
//! apply the change locally so the view updates immediately, then call the
//! remote API. When the remote call fails the local change is undone with a
//! compensating mutation and an error notification is shown. Rollbacks are
//! field-level and only touch a field that still holds the optimistic value,
//! so a refresh or a later action that landed in between is not clobbered.
//! Confirmations are field-level too: only the fields an action sent are
//! taken from the server's answer.
//!
//! Actions on the same incident run one at a time. Each one holds the
//! incident's lock from the moment it reads the board until its answer is
//! confirmed or rolled back, so two comments typed in quick succession both
//! end up in the notes.

use std::{collections::HashMap, sync::Arc};

use domain::models::{
    EntityId, ValidationError,
    client::{Client, CreateClient, UpdateClient},
    incident::{CreateIncident, Incident, IncidentStatus, InvalidTransition, UpdateIncident},
    technician::{Availability, Technician, UpdateTechnician},
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::{
    api::{ApiError, BackOfficeApi},
    board::Board,
    notification::NotificationService,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: EntityId },
    #[error("technician {id} is not available ({availability})")]
    TechnicianUnavailable {
        id: EntityId,
        availability: Availability,
    },
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// The remote call failed and the local change was rolled back.
    #[error("remote call failed: {0}")]
    Network(#[from] ApiError),
}

impl DispatchError {
    /// Rejected before any mutation took place.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, DispatchError::Network(_))
    }
}

/// The person operating the back office; recorded as `created_by` on new incidents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub name: String,
}

impl Operator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

fn not_found(entity: &'static str, id: &EntityId) -> DispatchError {
    DispatchError::NotFound {
        entity,
        id: id.clone(),
    }
}

/// Invalid input should have been caught by the form; log it loudly and refuse.
fn reject(action: &'static str, err: DispatchError) -> DispatchError {
    error!(action, error = %err, "Rejected invalid action");
    err
}

struct StatusPlan {
    previous_status: IncidentStatus,
    previous_technician: Option<EntityId>,
    technician: Option<(EntityId, String, Availability)>,
}

#[derive(Clone)]
pub struct ActionDispatcher {
    api: Arc<dyn BackOfficeApi>,
    board: Board,
    notifications: NotificationService,
    operator: Operator,
    incident_locks: Arc<Mutex<HashMap<EntityId, Arc<AsyncMutex<()>>>>>,
}

impl ActionDispatcher {
    pub fn new(
        api: Arc<dyn BackOfficeApi>,
        board: Board,
        notifications: NotificationService,
        operator: Operator,
    ) -> Self {
        Self {
            api,
            board,
            notifications,
            operator,
            incident_locks: Arc::default(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// Assign an available technician to an incident, moving it to `Assigned`
    /// and marking the technician busy.
    pub async fn assign_technician(
        &self,
        incident_id: &EntityId,
        technician_id: &EntityId,
    ) -> Result<Incident, DispatchError> {
        let _serial = self.lock_incident(incident_id).await;
        let plan = {
            let mut board = self.board.write();
            let incident = board
                .incidents
                .get(incident_id)
                .ok_or_else(|| not_found("incident", incident_id))
                .map_err(|e| reject("assign_technician", e))?;
            let technician = board
                .technicians
                .get(technician_id)
                .ok_or_else(|| not_found("technician", technician_id))
                .map_err(|e| reject("assign_technician", e))?;
            if !technician.is_available() {
                return Err(reject(
                    "assign_technician",
                    DispatchError::TechnicianUnavailable {
                        id: technician_id.clone(),
                        availability: technician.availability,
                    },
                ));
            }
            incident
                .status
                .transition(IncidentStatus::Assigned)
                .map_err(|e| reject("assign_technician", e.into()))?;

            let plan = StatusPlan {
                previous_status: incident.status,
                previous_technician: incident.technician_id.clone(),
                technician: Some((
                    technician_id.clone(),
                    technician.name.clone(),
                    technician.availability,
                )),
            };
            board.incidents.update(incident_id, |i| {
                i.status = IncidentStatus::Assigned;
                i.technician_id = Some(technician_id.clone());
            });
            board
                .technicians
                .update(technician_id, |t| t.availability = Availability::Busy);
            plan
        };

        let patch = UpdateIncident {
            status: Some(IncidentStatus::Assigned),
            technician_id: Some(Some(technician_id.clone())),
            ..Default::default()
        };
        let technician_name = plan
            .technician
            .as_ref()
            .map(|(_, name, _)| name.clone())
            .unwrap_or_default();

        match self
            .push_status_change(incident_id, &patch, &plan, Availability::Busy)
            .await
        {
            Ok((incident, technician)) => {
                self.confirm(&incident, &patch, technician.as_ref());
                info!(incident_id = %incident_id, technician_id = %technician_id, "Technician assigned");
                self.notifications
                    .success(format!("{technician_name} a été assigné à l'incident"));
                Ok(incident)
            }
            Err(e) => {
                self.rollback_status_change(
                    incident_id,
                    IncidentStatus::Assigned,
                    &plan,
                    Availability::Busy,
                );
                warn!(incident_id = %incident_id, technician_id = %technician_id, error = %e, "Assignment failed, rolled back");
                self.notifications.error(format!(
                    "Échec de l'assignation de {technician_name} : {e}"
                ));
                Err(e.into())
            }
        }
    }

    /// Move an incident along its lifecycle. Resolving an incident releases
    /// its technician if they are still marked busy.
    pub async fn change_status(
        &self,
        incident_id: &EntityId,
        status: IncidentStatus,
    ) -> Result<Incident, DispatchError> {
        let _serial = self.lock_incident(incident_id).await;
        let plan = {
            let mut board = self.board.write();
            let incident = board
                .incidents
                .get(incident_id)
                .ok_or_else(|| not_found("incident", incident_id))
                .map_err(|e| reject("change_status", e))?;
            incident
                .status
                .transition(status)
                .map_err(|e| reject("change_status", e.into()))?;

            let released = match (status, &incident.technician_id) {
                (IncidentStatus::Resolved, Some(technician_id)) => board
                    .technicians
                    .get(technician_id)
                    .filter(|t| t.availability == Availability::Busy)
                    .map(|t| (t.id.clone(), t.name.clone(), t.availability)),
                _ => None,
            };
            let plan = StatusPlan {
                previous_status: incident.status,
                previous_technician: incident.technician_id.clone(),
                technician: released,
            };

            board.incidents.update(incident_id, |i| i.status = status);
            if let Some((technician_id, _, _)) = &plan.technician {
                board
                    .technicians
                    .update(technician_id, |t| t.availability = Availability::Available);
            }
            plan
        };

        let patch = UpdateIncident {
            status: Some(status),
            ..Default::default()
        };
        match self
            .push_status_change(incident_id, &patch, &plan, Availability::Available)
            .await
        {
            Ok((incident, technician)) => {
                self.confirm(&incident, &patch, technician.as_ref());
                info!(incident_id = %incident_id, from = %plan.previous_status, to = %status, "Incident status changed");
                self.notifications
                    .success(format!("Statut de l'incident mis à jour : {status}"));
                Ok(incident)
            }
            Err(e) => {
                self.rollback_status_change(incident_id, status, &plan, Availability::Available);
                warn!(incident_id = %incident_id, error = %e, "Status change failed, rolled back");
                self.notifications
                    .error(format!("Échec du changement de statut : {e}"));
                Err(e.into())
            }
        }
    }

    /// Append a comment to the incident notes.
    pub async fn add_comment(
        &self,
        incident_id: &EntityId,
        text: &str,
    ) -> Result<Incident, DispatchError> {
        let comment = text.trim();
        if comment.is_empty() {
            return Err(reject("add_comment", ValidationError::EmptyComment.into()));
        }
        let _serial = self.lock_incident(incident_id).await;
        let (previous_notes, notes) = {
            let mut board = self.board.write();
            let incident = board
                .incidents
                .get(incident_id)
                .ok_or_else(|| not_found("incident", incident_id))
                .map_err(|e| reject("add_comment", e))?;
            let previous_notes = incident.notes.clone();
            let notes = incident.notes_with_comment(comment);
            let optimistic = notes.clone();
            board
                .incidents
                .update(incident_id, |i| i.notes = Some(optimistic));
            (previous_notes, notes)
        };

        let patch = UpdateIncident {
            notes: Some(notes.clone()),
            ..Default::default()
        };
        match self.api.update_incident(incident_id, &patch).await {
            Ok(incident) => {
                self.confirm(&incident, &patch, None);
                self.notifications.success("Commentaire ajouté");
                Ok(incident)
            }
            Err(e) => {
                self.board.write().incidents.update(incident_id, |i| {
                    if i.notes.as_deref() == Some(notes.as_str()) {
                        i.notes = previous_notes;
                    }
                });
                warn!(incident_id = %incident_id, error = %e, "Adding comment failed, rolled back");
                self.notifications
                    .error(format!("Échec de l'ajout du commentaire : {e}"));
                Err(e.into())
            }
        }
    }

    /// Remove an incident. On failure it is put back where it was.
    ///
    /// A `NotFound` answer means an earlier attempt already went through
    /// (a retried DELETE whose first response was lost) and counts as success.
    pub async fn delete_incident(&self, incident_id: &EntityId) -> Result<(), DispatchError> {
        let _serial = self.lock_incident(incident_id).await;
        let (index, removed) = self
            .board
            .write()
            .incidents
            .remove(incident_id)
            .ok_or_else(|| not_found("incident", incident_id))
            .map_err(|e| reject("delete_incident", e))?;

        match self.api.delete_incident(incident_id).await {
            Ok(()) => {
                info!(incident_id = %incident_id, "Incident deleted");
                self.notifications.info("Incident supprimé");
                Ok(())
            }
            Err(ApiError::NotFound(_)) => {
                debug!(incident_id = %incident_id, "Incident already gone on the server");
                self.notifications.info("Incident supprimé");
                Ok(())
            }
            Err(e) => {
                let mut board = self.board.write();
                if board.incidents.get(incident_id).is_none() {
                    board.incidents.insert_at(index, removed);
                }
                drop(board);
                warn!(incident_id = %incident_id, error = %e, "Deleting incident failed, restored");
                self.notifications
                    .error(format!("Échec de la suppression de l'incident : {e}"));
                Err(e.into())
            }
        }
    }

    /// Create an incident. It shows up at once under a `local-` id which is
    /// swapped for the server id when the call succeeds.
    pub async fn create_incident(&self, data: CreateIncident) -> Result<Incident, DispatchError> {
        data.validate()
            .map_err(|e| reject("create_incident", e.into()))?;

        let data = CreateIncident {
            created_by: data.created_by.or_else(|| Some(self.operator.name.clone())),
            ..data
        };
        let pending = Incident::pending(&data, data.created_by.clone());
        let local_id = pending.id.clone();
        self.board.write().incidents.insert_at(0, pending);

        match self.api.create_incident(&data).await {
            Ok(mut created) => {
                if created.id.as_str().is_empty() {
                    created.id = local_id.clone();
                }
                let mut board = self.board.write();
                if !board.incidents.replace(&local_id, created.clone()) {
                    board.incidents.upsert(created.clone());
                }
                drop(board);
                info!(incident_id = %created.id, "Incident created");
                self.notifications.success("Incident créé");
                Ok(created)
            }
            Err(e) => {
                self.board.write().incidents.remove(&local_id);
                warn!(error = %e, "Creating incident failed, removed pending entry");
                self.notifications
                    .error(format!("Échec de la création de l'incident : {e}"));
                Err(e.into())
            }
        }
    }

    pub async fn create_client(&self, data: CreateClient) -> Result<Client, DispatchError> {
        data.validate()
            .map_err(|e| reject("create_client", e.into()))?;

        let local_id = EntityId::local();
        self.board
            .write()
            .clients
            .upsert(Client::from_create(local_id.clone(), &data));

        match self.api.create_client(&data).await {
            Ok(mut created) => {
                if created.id.as_str().is_empty() {
                    created.id = local_id.clone();
                }
                let mut board = self.board.write();
                if !board.clients.replace(&local_id, created.clone()) {
                    board.clients.upsert(created.clone());
                }
                drop(board);
                info!(client_id = %created.id, "Client created");
                self.notifications.success("Client créé");
                Ok(created)
            }
            Err(e) => {
                self.board.write().clients.remove(&local_id);
                warn!(error = %e, "Creating client failed, removed pending entry");
                self.notifications
                    .error(format!("Échec de la création du client : {e}"));
                Err(e.into())
            }
        }
    }

    pub async fn update_client(
        &self,
        client_id: &EntityId,
        patch: UpdateClient,
    ) -> Result<Client, DispatchError> {
        let (previous, optimistic) = {
            let mut board = self.board.write();
            patch
                .validate()
                .map_err(|e| reject("update_client", e.into()))?;
            let previous = board
                .clients
                .get(client_id)
                .cloned()
                .ok_or_else(|| not_found("client", client_id))
                .map_err(|e| reject("update_client", e))?;
            let mut optimistic = previous.clone();
            optimistic.apply_patch(&patch);
            let local = optimistic.clone();
            board.clients.update(client_id, |c| *c = local);
            (previous, optimistic)
        };

        match self.api.update_client(client_id, &patch).await {
            Ok(client) => {
                let confirmed = client.clone();
                self.board
                    .write()
                    .clients
                    .update(client_id, |c| *c = confirmed);
                self.notifications.success("Client mis à jour");
                Ok(client)
            }
            Err(e) => {
                self.board.write().clients.update(client_id, |c| {
                    if *c == optimistic {
                        *c = previous;
                    }
                });
                warn!(client_id = %client_id, error = %e, "Updating client failed, rolled back");
                self.notifications
                    .error(format!("Échec de la mise à jour du client : {e}"));
                Err(e.into())
            }
        }
    }

    /// Same contract as [`Self::delete_incident`]: `NotFound` counts as deleted.
    pub async fn delete_client(&self, client_id: &EntityId) -> Result<(), DispatchError> {
        let (index, removed) = self
            .board
            .write()
            .clients
            .remove(client_id)
            .ok_or_else(|| not_found("client", client_id))
            .map_err(|e| reject("delete_client", e))?;

        match self.api.delete_client(client_id).await {
            Ok(()) => {
                info!(client_id = %client_id, "Client deleted");
                self.notifications.info("Client supprimé");
                Ok(())
            }
            Err(ApiError::NotFound(_)) => {
                debug!(client_id = %client_id, "Client already gone on the server");
                self.notifications.info("Client supprimé");
                Ok(())
            }
            Err(e) => {
                let mut board = self.board.write();
                if board.clients.get(client_id).is_none() {
                    board.clients.insert_at(index, removed);
                }
                drop(board);
                warn!(client_id = %client_id, error = %e, "Deleting client failed, restored");
                self.notifications
                    .error(format!("Échec de la suppression du client : {e}"));
                Err(e.into())
            }
        }
    }

    /// Send the incident patch, then the technician availability change if
    /// the plan has one. When the second call fails the incident is put back
    /// on the server so both sides stay consistent.
    async fn push_status_change(
        &self,
        incident_id: &EntityId,
        patch: &UpdateIncident,
        plan: &StatusPlan,
        availability: Availability,
    ) -> Result<(Incident, Option<Technician>), ApiError> {
        let incident = self.api.update_incident(incident_id, patch).await?;
        let Some((technician_id, _, _)) = &plan.technician else {
            return Ok((incident, None));
        };

        match self
            .api
            .update_technician(technician_id, &UpdateTechnician::availability(availability))
            .await
        {
            Ok(technician) => Ok((incident, Some(technician))),
            Err(e) => {
                let revert = UpdateIncident {
                    status: Some(plan.previous_status),
                    technician_id: patch
                        .technician_id
                        .as_ref()
                        .map(|_| plan.previous_technician.clone()),
                    ..Default::default()
                };
                if let Err(revert_err) = self.api.update_incident(incident_id, &revert).await {
                    error!(
                        incident_id = %incident_id,
                        error = %revert_err,
                        "Could not revert incident after technician update failed"
                    );
                }
                Err(e)
            }
        }
    }

    fn rollback_status_change(
        &self,
        incident_id: &EntityId,
        applied: IncidentStatus,
        plan: &StatusPlan,
        applied_availability: Availability,
    ) {
        let mut board = self.board.write();
        board.incidents.update(incident_id, |i| {
            if i.status == applied {
                i.status = plan.previous_status;
                i.technician_id = plan.previous_technician.clone();
            }
        });
        if let Some((technician_id, _, previous)) = &plan.technician {
            board.technicians.update(technician_id, |t| {
                if t.availability == applied_availability {
                    t.availability = *previous;
                }
            });
        }
    }

    fn confirm(
        &self,
        incident: &Incident,
        patch: &UpdateIncident,
        technician: Option<&Technician>,
    ) {
        let mut board = self.board.write();
        board
            .incidents
            .update(&incident.id, |local| local.settle_patched(incident, patch));
        if let Some(technician) = technician {
            board
                .technicians
                .update(&technician.id, |t| t.availability = technician.availability);
        }
    }

    /// Wait for the incident's lock. Idle locks are dropped on the way.
    async fn lock_incident(&self, incident_id: &EntityId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.incident_locks.lock();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(incident_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
