//! Shared fixtures for the wiremock integration tests.
//!
//! The description below is a trimmed-down version of what a HaveAPI
//! server publishes: projects with nested tasks, users referenced by
//! projects, the token sub-protocol with a TOTP step, OAuth2 endpoints and
//! the action state resource.

#![allow(dead_code)]

use haveapi_client::Client;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token_io() -> Value {
    json!({
        "layout": "hash",
        "namespace": "token",
        "parameters": {
            "token": {"type": "String"},
            "valid_to": {"type": "Datetime"},
            "complete": {"type": "Boolean"},
            "next_action": {"type": "String"}
        }
    })
}

fn project_params() -> Value {
    json!({
        "id": {"type": "Integer"},
        "label": {"type": "String"},
        "owner": {
            "type": "Resource",
            "resource": ["user"],
            "value_id": "id",
            "value_label": "login"
        }
    })
}

fn action_state_params() -> Value {
    json!({
        "id": {"type": "Integer"},
        "label": {"type": "String"},
        "finished": {"type": "Boolean"},
        "status": {"type": "Boolean"},
        "current": {"type": "Integer"},
        "total": {"type": "Integer"},
        "unit": {"type": "String"},
        "can_cancel": {"type": "Boolean"}
    })
}

/// The version document served for version `1`.
pub fn version_document() -> Value {
    json!({
        "authentication": {
            "basic": {},
            "token": {
                "http_header": "X-HaveAPI-Auth-Token",
                "query_parameter": "_auth_token",
                "resources": {
                    "token": {
                        "actions": {
                            "request": {
                                "method": "POST",
                                "url": "/_auth/token/tokens",
                                "auth": false,
                                "input": {
                                    "layout": "hash",
                                    "namespace": "token",
                                    "parameters": {
                                        "user": {"type": "String", "required": true},
                                        "password": {"type": "String", "required": true},
                                        "lifetime": {"type": "String", "required": true},
                                        "interval": {"type": "Integer"},
                                        "scope": {"type": "String"}
                                    }
                                },
                                "output": token_io()
                            },
                            "totp": {
                                "method": "POST",
                                "url": "/_auth/token/tokens/totp",
                                "auth": false,
                                "input": {
                                    "layout": "hash",
                                    "namespace": "token",
                                    "parameters": {
                                        "token": {"type": "String", "required": true},
                                        "code": {"type": "String", "required": true}
                                    }
                                },
                                "output": token_io()
                            },
                            "renew": {
                                "method": "PUT",
                                "url": "/_auth/token/tokens/renew",
                                "output": token_io()
                            },
                            "revoke": {
                                "method": "POST",
                                "url": "/_auth/token/tokens/revoke"
                            }
                        }
                    }
                }
            },
            "oauth2": {
                "authorize_url": "/_auth/oauth2/authorize",
                "token_url": "/_auth/oauth2/token",
                "revoke_url": "/_auth/oauth2/revoke"
            }
        },
        "meta": {"namespace": "_meta"},
        "resources": {
            "user": {
                "actions": {
                    "show": {
                        "method": "GET",
                        "url": "/v1/users/{user_id}",
                        "output": {
                            "layout": "object",
                            "namespace": "user",
                            "parameters": {
                                "id": {"type": "Integer"},
                                "login": {"type": "String"}
                            }
                        }
                    }
                }
            },
            "project": {
                "actions": {
                    "index": {
                        "method": "GET",
                        "url": "/v1/projects",
                        "aliases": ["list"],
                        "input": {
                            "layout": "object",
                            "namespace": "project",
                            "parameters": {"limit": {"type": "Integer"}}
                        },
                        "output": {
                            "layout": "object_list",
                            "namespace": "projects",
                            "parameters": project_params()
                        }
                    },
                    "show": {
                        "method": "GET",
                        "url": "/v1/projects/{project_id}",
                        "output": {
                            "layout": "object",
                            "namespace": "project",
                            "parameters": project_params()
                        }
                    },
                    "create": {
                        "method": "POST",
                        "url": "/v1/projects",
                        "blocking": true,
                        "input": {
                            "layout": "object",
                            "namespace": "project",
                            "parameters": {
                                "label": {
                                    "type": "String",
                                    "required": true,
                                    "validators": {"length": {"min": 2}}
                                }
                            }
                        },
                        "output": {
                            "layout": "object",
                            "namespace": "project",
                            "parameters": project_params()
                        }
                    }
                },
                "resources": {
                    "task": {
                        "actions": {
                            "index": {
                                "method": "GET",
                                "url": "/v1/projects/{project_id}/tasks",
                                "output": {
                                    "layout": "object_list",
                                    "namespace": "tasks",
                                    "parameters": {
                                        "id": {"type": "Integer"},
                                        "label": {"type": "String"}
                                    }
                                }
                            },
                            "create": {
                                "method": "POST",
                                "url": "/v1/projects/{project_id}/tasks",
                                "input": {
                                    "layout": "object",
                                    "namespace": "task",
                                    "parameters": {
                                        "label": {"type": "String", "required": true}
                                    }
                                },
                                "output": {
                                    "layout": "object",
                                    "namespace": "task",
                                    "parameters": {
                                        "id": {"type": "Integer"},
                                        "label": {"type": "String"}
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "action_state": {
                "actions": {
                    "index": {
                        "method": "GET",
                        "url": "/v1/action_states",
                        "output": {
                            "layout": "hash_list",
                            "namespace": "action_states",
                            "parameters": action_state_params()
                        }
                    },
                    "poll": {
                        "method": "GET",
                        "url": "/v1/action_states/{action_state_id}/poll",
                        "input": {
                            "layout": "hash",
                            "namespace": "action_state",
                            "parameters": {
                                "timeout": {"type": "Float"},
                                "update_in": {"type": "Float"},
                                "status": {"type": "Boolean"},
                                "current": {"type": "Integer"},
                                "total": {"type": "Integer"}
                            }
                        },
                        "output": {
                            "layout": "hash",
                            "namespace": "action_state",
                            "parameters": action_state_params()
                        }
                    },
                    "show": {
                        "method": "GET",
                        "url": "/v1/action_states/{action_state_id}",
                        "output": {
                            "layout": "hash",
                            "namespace": "action_state",
                            "parameters": action_state_params()
                        }
                    },
                    "cancel": {
                        "method": "POST",
                        "url": "/v1/action_states/{action_state_id}/cancel"
                    }
                }
            }
        }
    })
}

/// The root document listing every version.
pub fn root_document() -> Value {
    json!({
        "default_version": 1,
        "versions": {
            "1": version_document(),
            "default": version_document()
        }
    })
}

/// A successful envelope.
pub fn ok(response: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": true,
        "response": response,
        "message": null,
        "errors": null
    }))
}

/// A refused action.
pub fn failed(message: &str, errors: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": false,
        "response": null,
        "message": message,
        "errors": errors
    }))
}

/// Starts a server that serves the description.
pub async fn server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("OPTIONS"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "response": root_document(),
            "message": null,
            "errors": null,
            "version": "2.0"
        })))
        .mount(&server)
        .await;
    server
}

/// A client that has fetched the description.
pub async fn client(server: &MockServer) -> Client {
    let client = Client::new(server.uri()).unwrap();
    client.setup().await.unwrap();
    client
}

/// Number of requests the server saw for a path.
pub async fn hits(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}
