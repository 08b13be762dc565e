// Helpdesk schema - ticketing tables for Diesel ORM

diesel::table! {
    schema_versions (id) {
        id -> Integer,
        version -> Text,
        name -> Text,
        features -> Text,
        introduced_at -> Text,
    }
}

// ============================================================================
// Directory Tables
// ============================================================================

diesel::table! {
    departments (id) {
        id -> Integer,
        name -> Text,
        description -> Nullable<Text>,
    }
}

diesel::table! {
    skills (id) {
        id -> Integer,
        name -> Text,
        description -> Nullable<Text>,
    }
}

diesel::table! {
    users (id) {
        id -> Integer,
        name -> Text,
        email -> Text,
        birth_date -> Nullable<Text>,   // YYYY-MM-DD
        user_type -> Text,              // REGULAR, TECHNICIAN, MANAGER, HR
        department -> Nullable<Text>,
        phone -> Nullable<Text>,
        registered_at -> Text,
        status -> Text,                 // ACTIVE, INACTIVE
        credential -> Text,             // salt$digest, never plaintext
    }
}

diesel::table! {
    technician_skills (technician_id, skill_id) {
        technician_id -> Integer,
        skill_id -> Integer,
    }
}

// ============================================================================
// Ticket Tables
// ============================================================================

diesel::table! {
    tickets (id) {
        id -> Integer,
        description -> Text,
        category -> Text,
        urgency -> Text,
        status -> Text,
        requester_id -> Integer,
        technician_id -> Nullable<Integer>,
        solution -> Nullable<Text>,
        opened_at -> Text,
        closed_at -> Nullable<Text>,
        total_attendance_minutes -> Nullable<Double>,
    }
}

diesel::table! {
    ticket_history (id) {
        id -> Integer,
        ticket_id -> Integer,
        recorded_at -> Text,
        description -> Text,
        user_id -> Integer,
    }
}

diesel::table! {
    notifications (id) {
        id -> Integer,
        recipient_id -> Integer,
        message -> Text,
        ticket_id -> Nullable<Integer>,
        kind -> Text,                   // UPDATE, ASSIGNMENT, RESOLUTION
        sent_at -> Text,
        is_read -> Bool,
    }
}

diesel::table! {
    time_logs (id) {
        id -> Integer,
        ticket_id -> Integer,
        technician_id -> Integer,
        logged_at -> Text,
        minutes -> Double,
        activity -> Text,
    }
}

diesel::table! {
    evaluations (id) {
        id -> Integer,
        ticket_id -> Integer,
        evaluator_id -> Integer,
        score -> Integer,
        comment -> Nullable<Text>,
        evaluated_at -> Text,
    }
}

// ============================================================================
// Triage Reference Tables
// ============================================================================

diesel::table! {
    sla_entries (id) {
        id -> Integer,
        category -> Text,
        urgency -> Text,
        max_resolution_hours -> Integer,
    }
}

diesel::table! {
    knowledge_articles (id) {
        id -> Integer,
        category -> Text,
        title -> Text,
        description -> Text,
        solution -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    departments,
    skills,
    users,
    technician_skills,
    tickets,
    ticket_history,
    notifications,
    time_logs,
    evaluations,
    sla_entries,
    knowledge_articles,
);
